//! Core business logic module
//!
//! This module contains the ledger engine components:
//! - `traits` - Storage abstractions (`LedgerStore`, `TransactionStore`)
//! - `ledger_store` - In-memory accounts, reservations and credits
//! - `transaction_store` - In-memory transaction log and work queue
//! - `shard` - Stable account-to-shard mapping
//! - `call_queue` - Per-shard call queues and per-call result slots
//! - `call_bridge` - Submit-and-wait access to the shard managers
//! - `account_manager` - Per-shard executor of balance calls
//! - `processor` - Saga driving transfers to a final status
//! - `service` - Caller-facing façade
//! - `engine` - Construction, worker tasks and shutdown

pub mod account_manager;
pub mod call_bridge;
pub mod call_queue;
pub mod engine;
pub mod ledger_store;
pub mod processor;
pub mod service;
pub mod shard;
pub mod traits;
pub mod transaction_store;

pub use account_manager::AccountBalanceManager;
pub use call_bridge::CallBridge;
pub use call_queue::CallQueue;
pub use engine::TransferEngine;
pub use ledger_store::InMemoryLedgerStore;
pub use processor::TransactionProcessor;
pub use service::{MoneyTransferService, CASH_DESK_IN, CASH_DESK_OUT};
pub use traits::{LedgerStore, TransactionStore};
pub use transaction_store::InMemoryTransactionStore;
