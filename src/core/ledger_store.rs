//! In-memory Ledger Store
//!
//! This module provides `InMemoryLedgerStore`, which keeps accounts, their
//! reservations and their credit records in a concurrent map.
//!
//! # Design
//!
//! Each account is one row of a `DashMap`, holding the account together with
//! the reservations and credits keyed by transaction id. Every operation
//! locks exactly one row, so the "update balance and reservation status"
//! pair used by debits is applied as a single unit.
//!
//! # Thread Safety
//!
//! All operations are safe to call concurrently. In practice each row has a
//! single writer (the Account Balance Manager of the account's shard); the
//! row lock only guards against concurrent readers such as `account_ids`.

use std::collections::HashMap;

use dashmap::DashMap;
use rust_decimal::Decimal;

use super::traits::LedgerStore;
use crate::types::{Account, AccountId, LedgerError, Reservation, ReservationStatus, TransactionId};

#[derive(Debug)]
struct AccountRow {
    account: Account,
    /// Key: transaction id
    reservations: HashMap<TransactionId, Reservation>,
    /// Key: transaction id, value: credited amount
    credits: HashMap<TransactionId, Decimal>,
}

impl AccountRow {
    fn new(account: Account) -> Self {
        Self {
            account,
            reservations: HashMap::new(),
            credits: HashMap::new(),
        }
    }

    fn reservation_mut(&mut self, transaction_id: TransactionId) -> Result<&mut Reservation, LedgerError> {
        let account_id = &self.account.id;
        self.reservations
            .get_mut(&transaction_id)
            .ok_or_else(|| LedgerError::reservation_not_found(account_id, transaction_id))
    }
}

/// Thread-safe in-memory account and reservation storage
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    accounts: DashMap<AccountId, AccountRow>,
}

impl InMemoryLedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    fn with_row<T, F>(&self, account_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut AccountRow) -> Result<T, LedgerError>,
    {
        match self.accounts.get_mut(account_id) {
            Some(mut row) => f(row.value_mut()),
            None => Err(LedgerError::account_not_found(account_id)),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        use dashmap::mapref::entry::Entry;

        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::account_already_exists(&account.id)),
            Entry::Vacant(entry) => {
                entry.insert(AccountRow::new(account));
                Ok(())
            }
        }
    }

    fn account_ids(&self) -> Vec<AccountId> {
        // Snapshot; later inserts are not reflected
        self.accounts.iter().map(|row| row.key().clone()).collect()
    }

    fn get_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        self.accounts
            .get(account_id)
            .map(|row| row.account.clone())
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    fn save_reservation(&self, reservation: Reservation) -> Result<(), LedgerError> {
        let account_id = reservation.account_id.clone();
        self.with_row(&account_id, |row| {
            let transaction_id = reservation.transaction_id;
            if row.reservations.contains_key(&transaction_id) {
                return Err(LedgerError::reservation_already_exists(
                    &account_id,
                    transaction_id,
                ));
            }
            row.reservations.insert(transaction_id, reservation);
            Ok(())
        })
    }

    fn find_reservation(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.with_row(account_id, |row| {
            Ok(row.reservations.get(&transaction_id).cloned())
        })
    }

    fn reservations_with_status_ok(&self, account_id: &str) -> Result<Vec<Reservation>, LedgerError> {
        self.with_row(account_id, |row| {
            Ok(row
                .reservations
                .values()
                .filter(|reservation| reservation.status == ReservationStatus::Ok)
                .cloned()
                .collect())
        })
    }

    fn update_balance_and_reservation_status(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        balance: Decimal,
        status: ReservationStatus,
    ) -> Result<(), LedgerError> {
        self.with_row(account_id, |row| {
            row.reservation_mut(transaction_id)?.status = status;
            row.account.balance = balance;
            Ok(())
        })
    }

    fn update_reservation_status(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        status: ReservationStatus,
    ) -> Result<(), LedgerError> {
        self.with_row(account_id, |row| {
            row.reservation_mut(transaction_id)?.status = status;
            Ok(())
        })
    }

    fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<(), LedgerError> {
        self.with_row(account_id, |row| {
            row.account.balance = balance;
            Ok(())
        })
    }

    fn find_credit(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Option<Decimal>, LedgerError> {
        self.with_row(account_id, |row| Ok(row.credits.get(&transaction_id).copied()))
    }

    fn update_balance_with_credit(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        amount: Decimal,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        self.with_row(account_id, |row| {
            row.credits.insert(transaction_id, amount);
            row.account.balance = balance;
            Ok(())
        })
    }
}
