//! Storage traits for the ledger and the transaction log
//!
//! The engine only assumes the operations below; the in-memory implementations
//! in this crate can be replaced by a relational or KV-backed store without
//! touching the managers or the processor.

use crate::types::{
    Account, AccountId, LedgerError, Reservation, ReservationStatus, StatusRecord, StoreError,
    Transaction, TransactionId, TransactionStatus,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// Account and reservation storage
///
/// Every operation is scoped to a single account and atomic at the storage
/// layer. The Account Balance Manager owning the account's shard is the only
/// writer, so no higher-level locking is needed.
pub trait LedgerStore: Send + Sync {
    /// Insert a new account
    fn create_account(&self, account: Account) -> Result<(), LedgerError>;

    /// Ids of all accounts
    fn account_ids(&self) -> Vec<AccountId>;

    /// Fetch an account, failing with `AccountNotFound` when absent
    fn get_account(&self, account_id: &str) -> Result<Account, LedgerError>;

    /// Insert a reservation; at most one exists per (account, transaction)
    fn save_reservation(&self, reservation: Reservation) -> Result<(), LedgerError>;

    /// Look up the reservation of a transaction on an account
    fn find_reservation(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Option<Reservation>, LedgerError>;

    /// All reservations of an account in status `Ok`
    fn reservations_with_status_ok(&self, account_id: &str) -> Result<Vec<Reservation>, LedgerError>;

    /// Set balance and reservation status as one unit (debit)
    fn update_balance_and_reservation_status(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        balance: Decimal,
        status: ReservationStatus,
    ) -> Result<(), LedgerError>;

    /// Set the reservation status alone (cancel)
    fn update_reservation_status(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        status: ReservationStatus,
    ) -> Result<(), LedgerError>;

    /// Set the balance alone (credit without a transaction)
    fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<(), LedgerError>;

    /// Amount already credited to an account for a transaction
    fn find_credit(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Option<Decimal>, LedgerError>;

    /// Set the balance and record the credit of a transaction as one unit
    fn update_balance_with_credit(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        amount: Decimal,
        balance: Decimal,
    ) -> Result<(), LedgerError>;
}

/// Durable transaction log with status notifications and a work queue
///
/// The work queue has at-least-once semantics: a transaction handed out by
/// `get_next` stays pending until `commit_processed`, and
/// `requeue_unprocessed` hands pending ones out again.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Register a transaction with status `Created` and queue it
    async fn save_new(&self, transaction: Transaction) -> Result<(), StoreError>;

    /// The transaction and its last persisted status
    async fn get(&self, transaction_id: TransactionId)
        -> Result<(Transaction, StatusRecord), StoreError>;

    /// Persist a transition and wake every waiter on this transaction
    async fn update_status(
        &self,
        transaction_id: TransactionId,
        status: StatusRecord,
    ) -> Result<(), StoreError>;

    /// Block until the status differs from `previous` or `timeout` elapses
    ///
    /// Returns the current, possibly unchanged, status.
    async fn wait_for_status(
        &self,
        transaction_id: TransactionId,
        previous: TransactionStatus,
        timeout: Duration,
    ) -> Result<StatusRecord, StoreError>;

    /// Next unprocessed transaction, oldest first, or `None` after `timeout`
    async fn get_next(&self, timeout: Duration) -> Option<Transaction>;

    /// Mark a dequeued transaction as fully processed
    async fn commit_processed(&self, transaction_id: TransactionId) -> Result<(), StoreError>;

    /// Queue every dequeued but uncommitted transaction again
    ///
    /// Returns how many were requeued.
    async fn requeue_unprocessed(&self) -> usize;
}
