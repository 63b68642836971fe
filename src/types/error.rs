//! Error types for the money transfer engine
//!
//! Each component boundary has its own error enum:
//!
//! - **LedgerError**: data access failures inside a shard (missing account,
//!   missing reservation, reservation in the wrong state, arithmetic)
//! - **CallError**: a balance call failed or its result did not arrive in time
//! - **StoreError**: Transaction Store failures
//! - **TransferError**: what façade callers see (validation, denial,
//!   transaction failure, timeout)
//!
//! Only `TransferError` crosses the façade; the inner errors are turned into
//! call results and saga status transitions before that.

use super::account::{AccountId, ReservationStatus};
use super::call::{CallId, CallValue};
use super::transaction::{TransactionId, TransactionStatus};
use std::time::Duration;
use thiserror::Error;

/// Ledger Store and balance execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: AccountId },

    #[error("Account already exists: {account_id}")]
    AccountAlreadyExists { account_id: AccountId },

    #[error("Reservation not found for account {account_id}, transaction {transaction_id}")]
    ReservationNotFound {
        account_id: AccountId,
        transaction_id: TransactionId,
    },

    #[error("Reservation already exists for account {account_id}, transaction {transaction_id}")]
    ReservationAlreadyExists {
        account_id: AccountId,
        transaction_id: TransactionId,
    },

    /// Debit and cancel only apply to reservations in status OK
    #[error("Reservation for account {account_id}, transaction {transaction_id} is {status}, expected OK")]
    ReservationNotOk {
        account_id: AccountId,
        transaction_id: TransactionId,
        status: ReservationStatus,
    },

    /// A call arrived without a field its type requires
    #[error("{call_type} call is missing its {field}")]
    MissingField {
        call_type: String,
        field: &'static str,
    },

    #[error("Arithmetic overflow in {operation} for account {account_id}")]
    ArithmeticOverflow {
        operation: String,
        account_id: AccountId,
    },

    #[error("Arithmetic underflow in {operation} for account {account_id}")]
    ArithmeticUnderflow {
        operation: String,
        account_id: AccountId,
    },
}

impl LedgerError {
    pub fn account_not_found(account_id: &str) -> Self {
        LedgerError::AccountNotFound {
            account_id: account_id.to_string(),
        }
    }

    pub fn account_already_exists(account_id: &str) -> Self {
        LedgerError::AccountAlreadyExists {
            account_id: account_id.to_string(),
        }
    }

    pub fn reservation_not_found(account_id: &str, transaction_id: TransactionId) -> Self {
        LedgerError::ReservationNotFound {
            account_id: account_id.to_string(),
            transaction_id,
        }
    }

    pub fn reservation_already_exists(account_id: &str, transaction_id: TransactionId) -> Self {
        LedgerError::ReservationAlreadyExists {
            account_id: account_id.to_string(),
            transaction_id,
        }
    }

    pub fn reservation_not_ok(
        account_id: &str,
        transaction_id: TransactionId,
        status: ReservationStatus,
    ) -> Self {
        LedgerError::ReservationNotOk {
            account_id: account_id.to_string(),
            transaction_id,
            status,
        }
    }

    pub fn missing_field(call_type: impl ToString, field: &'static str) -> Self {
        LedgerError::MissingField {
            call_type: call_type.to_string(),
            field,
        }
    }

    pub fn arithmetic_overflow(operation: &str, account_id: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account_id: account_id.to_string(),
        }
    }

    pub fn arithmetic_underflow(operation: &str, account_id: &str) -> Self {
        LedgerError::ArithmeticUnderflow {
            operation: operation.to_string(),
            account_id: account_id.to_string(),
        }
    }
}

/// Failure of a balance call, as seen by the submitter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The shard manager ran the call and it failed
    #[error("Call (id = {call_id}) execution failed: {message}")]
    Execution { call_id: CallId, message: String },

    /// No result within the bridge timeout; the outcome is unknown
    #[error("Call (id = {call_id}) result not received within {waited:?}")]
    Timeout { call_id: CallId, waited: Duration },

    /// The shard queue is gone (engine shut down)
    #[error("Call queue for shard {shard} is closed")]
    QueueClosed { shard: usize },

    #[error("Shard index {shard} out of range (shard count {shard_count})")]
    InvalidShard { shard: usize, shard_count: usize },

    #[error("No pending call with id {call_id}")]
    UnknownCall { call_id: CallId },

    #[error("Call (id = {call_id}) already has a result")]
    ResultAlreadyPosted { call_id: CallId },

    /// The result payload does not match the call type
    #[error("Call (id = {call_id}) returned an unexpected result: {value}")]
    UnexpectedResult { call_id: CallId, value: String },
}

impl CallError {
    pub fn execution(call_id: CallId, message: impl ToString) -> Self {
        CallError::Execution {
            call_id,
            message: message.to_string(),
        }
    }

    pub fn timeout(call_id: CallId, waited: Duration) -> Self {
        CallError::Timeout { call_id, waited }
    }

    pub fn unexpected_result(call_id: CallId, value: &CallValue) -> Self {
        CallError::UnexpectedResult {
            call_id,
            value: format!("{:?}", value),
        }
    }

    /// Whether the outcome of the call is unknown rather than failed
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }
}

/// Transaction Store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: TransactionId },

    #[error("Transaction already registered: {transaction_id}")]
    DuplicateTransaction { transaction_id: TransactionId },

    /// Final statuses are never left
    #[error("Transaction {transaction_id} is already final ({status}), cannot move to {next}")]
    TransitionFromFinal {
        transaction_id: TransactionId,
        status: TransactionStatus,
        next: TransactionStatus,
    },
}

impl StoreError {
    pub fn transaction_not_found(transaction_id: TransactionId) -> Self {
        StoreError::TransactionNotFound { transaction_id }
    }

    pub fn duplicate_transaction(transaction_id: TransactionId) -> Self {
        StoreError::DuplicateTransaction { transaction_id }
    }
}

/// Caller-visible errors of the money transfer façade
///
/// `Denied` is a normal business outcome; `Failed` means the system needs
/// investigation; `Timeout` means the outcome is not yet known and the status
/// can be queried again by transaction id.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    /// Rejected before any transaction was registered
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Transaction '{transaction_id}' denied: {}", reason.as_deref().unwrap_or("no reason given"))]
    Denied {
        transaction_id: TransactionId,
        reason: Option<String>,
    },

    #[error("Transaction '{transaction_id}' failed; status: {status}; reason: {}", reason.as_deref().unwrap_or("no reason given"))]
    Failed {
        transaction_id: TransactionId,
        status: TransactionStatus,
        reason: Option<String>,
    },

    #[error("Transaction '{transaction_id}' did not finish in time; last status: {last_status}")]
    Timeout {
        transaction_id: TransactionId,
        last_status: TransactionStatus,
    },

    #[error("Account {account_id}: {message}")]
    Account { account_id: AccountId, message: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransferError {
    pub fn validation(message: impl ToString) -> Self {
        TransferError::Validation {
            message: message.to_string(),
        }
    }

    pub fn account(account_id: &str, message: impl ToString) -> Self {
        TransferError::Account {
            account_id: account_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this is a business rejection rather than a system fault
    pub fn is_denial(&self) -> bool {
        matches!(self, TransferError::Denied { .. })
    }
}
