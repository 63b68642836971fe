//! Account-related types for the money transfer engine
//!
//! This module defines the Account and Reservation structures that make up
//! the ledger, together with the reservation status lifecycle.

use super::transaction::TransactionId;
use rust_decimal::Decimal;
use std::fmt;

/// Account identifier
///
/// Opaque string; generated accounts use a random UUID, scripted accounts
/// may use any non-empty name.
pub type AccountId = String;

/// Ledger account
///
/// Owned exclusively by the Account Balance Manager of its shard. The balance
/// only changes through debit and credit calls; reservations never touch it.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// The account identifier
    pub id: AccountId,

    /// Actual balance, not reduced by outstanding reservations
    pub balance: Decimal,
}

impl Account {
    /// Create a new account with zero balance
    pub fn new(id: impl Into<AccountId>) -> Self {
        Self::with_balance(id, Decimal::ZERO)
    }

    /// Create a new account with an opening balance
    ///
    /// Used for the pre-funded cash desk account.
    pub fn with_balance(id: impl Into<AccountId>, balance: Decimal) -> Self {
        Account {
            id: id.into(),
            balance,
        }
    }
}

/// Reservation lifecycle status
///
/// ```text
///  (none) -> Ok -> Debited
///                -> Canceled
///  (none) -> Denied
/// ```
///
/// `Debited`, `Canceled` and `Denied` are final and never re-enter `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationStatus {
    /// Money is set aside and counts against the available balance
    Ok,
    /// The reserved amount was taken from the balance
    Debited,
    /// The reservation was released without touching the balance
    Canceled,
    /// The reservation was refused for insufficient available balance
    Denied,
}

impl ReservationStatus {
    /// Whether this status can never change again
    pub fn is_final(self) -> bool {
        !matches!(self, ReservationStatus::Ok)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationStatus::Ok => "OK",
            ReservationStatus::Debited => "DEBITED",
            ReservationStatus::Canceled => "CANCELED",
            ReservationStatus::Denied => "DENIED",
        };
        f.write_str(name)
    }
}

/// Money provisionally set aside on an account for one transaction
///
/// Keyed by `(account_id, transaction_id)`; at most one reservation exists
/// per key, which makes every balance call for a transaction idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    /// Always positive
    pub amount: Decimal,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Create a reservation in status `Ok`
    pub fn new(account_id: impl Into<AccountId>, transaction_id: TransactionId, amount: Decimal) -> Self {
        Reservation {
            account_id: account_id.into(),
            transaction_id,
            amount,
            status: ReservationStatus::Ok,
        }
    }
}
