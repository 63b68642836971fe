//! Money Transfer Engine Library
//! # Overview
//!
//! This library moves money between accounts with exactly-once effect under
//! concurrent access. It uses a saga instead of cross-account locks or
//! two-phase commit.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Reservation, Call, Transaction, errors)
//! - [`config`] - Engine configuration
//! - [`core`] - Business logic components:
//!   - [`core::account_manager`] - One worker per shard owning its accounts
//!   - [`core::call_bridge`] - Blocking calls on top of the shard queues
//!   - [`core::processor`] - The transfer saga
//!   - [`core::service`] - Validating façade
//!   - [`core::engine`] - Wiring and shutdown
//! - [`io`] - Command script parsing and balance output
//! - [`script`] - Script replay used by the binary
//! - [`cli`] - CLI arguments parsing
//! - [`logging`] - tracing subscriber setup
//!
//! # Transfer Lifecycle
//!
//! Every transfer moves through these statuses, each one persisted:
//!
//! - **CREATED**: registered, nothing reserved yet
//! - **RESERVED**: the amount is set aside on the source account
//! - **ADDED**: the destination account was credited
//! - **CANCELLING**: the credit failed, the reservation is being released
//! - **DONE**: the source account was debited (final)
//! - **DENIED**: rejected or compensated, no money moved (final)
//! - **ERROR**: inconsistent state that needs an operator (final)
//!
//! # Accounts
//!
//! Each account keeps a balance; its available balance is the balance minus
//! the amounts reserved by transfers still in flight.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod script;
pub mod types;

pub use config::EngineConfig;
pub use core::{MoneyTransferService, TransferEngine};
pub use io::write_balances_csv;
pub use script::{ScriptRunner, ScriptSummary};
pub use types::{
    Account, AccountId, StatusRecord, Transaction, TransactionId, TransactionStatus, TransferError,
};
