//! Transaction-related types for the money transfer engine
//!
//! This module defines the registered transfer, its identifier and the saga
//! status machine the Transaction Processor drives it through.

use super::account::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Transaction identifier
///
/// ULID-based, so identifiers sort by creation time and "oldest first"
/// is simply ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(ulid::Ulid);

/// Process-wide generator; ids created within one millisecond still ascend
static GENERATOR: OnceLock<Mutex<ulid::Generator>> = OnceLock::new();

impl TransactionId {
    /// Generate a new time-ordered identifier
    ///
    /// Strictly greater than every id generated before it in this process.
    pub fn new() -> Self {
        let mut generator = GENERATOR
            .get_or_init(|| Mutex::new(ulid::Generator::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Overflow needs 2^80 ids in one millisecond
        let id = generator.generate().unwrap_or_else(|_| ulid::Ulid::new());
        Self(id)
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Saga status of a transfer
///
/// ```text
/// Created    --reserve OK-------------> Reserved
/// Created    --reserve DENIED/CANCELED-> Denied
/// Created    --reserve DEBITED--------> Error
/// Created    --reserve call failed----> Error
/// Reserved   --credit OK--------------> Added
/// Reserved   --credit failed----------> Cancelling
/// Added      --debit OK---------------> Done
/// Added      --debit failed-----------> Error
/// Cancelling --cancel OK--------------> Denied
/// Cancelling --cancel failed----------> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Newly registered, nothing done yet
    Created,
    /// Money is reserved on the source account
    Reserved,
    /// Money is credited to the destination account
    Added,
    /// The credit failed and the source reservation is being released
    Cancelling,
    /// Transfer completed
    Done,
    /// Business rejection, e.g. insufficient funds
    Denied,
    /// Fatal inconsistency, needs operator attention
    Error,
}

impl TransactionStatus {
    /// Whether the saga stops in this status
    pub fn is_final(self) -> bool {
        matches!(
            self,
            TransactionStatus::Done | TransactionStatus::Denied | TransactionStatus::Error
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Created => "CREATED",
            TransactionStatus::Reserved => "RESERVED",
            TransactionStatus::Added => "ADDED",
            TransactionStatus::Cancelling => "CANCELLING",
            TransactionStatus::Done => "DONE",
            TransactionStatus::Denied => "DENIED",
            TransactionStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Immutable `{status, reason}` value persisted on every transition
///
/// A new record is built per transition and never mutated afterwards, so it
/// can be shared between the processor and any number of status waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub status: TransactionStatus,

    /// Diagnostic reason attached to `Cancelling`, `Denied` and `Error`
    pub reason: Option<String>,
}

impl StatusRecord {
    /// Status without a reason
    pub fn new(status: TransactionStatus) -> Self {
        StatusRecord {
            status,
            reason: None,
        }
    }

    /// Status carrying a diagnostic reason
    pub fn with_reason(status: TransactionStatus, reason: impl Into<String>) -> Self {
        StatusRecord {
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn created() -> Self {
        Self::new(TransactionStatus::Created)
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.status, reason),
            None => write!(f, "{}", self.status),
        }
    }
}

/// A registered transfer between two accounts
///
/// Created once by the façade and never deleted. Its status lives in the
/// Transaction Store, not on this value, so the record itself is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id_from: AccountId,
    pub account_id_to: AccountId,
    /// Always positive
    pub amount: Decimal,
}

impl Transaction {
    /// Create a transfer with a fresh time-ordered id
    pub fn new(
        account_id_from: impl Into<AccountId>,
        account_id_to: impl Into<AccountId>,
        amount: Decimal,
    ) -> Self {
        Transaction {
            id: TransactionId::new(),
            account_id_from: account_id_from.into(),
            account_id_to: account_id_to.into(),
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::created(TransactionStatus::Created, false)]
    #[case::reserved(TransactionStatus::Reserved, false)]
    #[case::added(TransactionStatus::Added, false)]
    #[case::cancelling(TransactionStatus::Cancelling, false)]
    #[case::done(TransactionStatus::Done, true)]
    #[case::denied(TransactionStatus::Denied, true)]
    #[case::error(TransactionStatus::Error, true)]
    fn test_status_finality(#[case] status: TransactionStatus, #[case] expected: bool) {
        assert_eq!(status.is_final(), expected);
    }

    #[test]
    fn test_transaction_ids_are_time_ordered() {
        let ids: Vec<TransactionId> = (0..1000).map(|_| TransactionId::new()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_transaction_ids_ascend_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..250).map(|_| TransactionId::new()).collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_transaction_id_parses_its_display_form() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_status_record_display_includes_reason() {
        let record = StatusRecord::with_reason(TransactionStatus::Denied, "insufficient funds");
        assert_eq!(record.to_string(), "DENIED (insufficient funds)");
        assert_eq!(StatusRecord::created().to_string(), "CREATED");
    }
}
