//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account and Reservation types
//! - `transaction`: Transaction, its identifier and saga status
//! - `call`: Balance calls and their results
//! - `error`: Error types for every component boundary

pub mod account;
pub mod call;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountId, Reservation, ReservationStatus};
pub use call::{Call, CallId, CallResult, CallType, CallValue};
pub use error::{CallError, LedgerError, StoreError, TransferError};
pub use transaction::{StatusRecord, Transaction, TransactionId, TransactionStatus};
