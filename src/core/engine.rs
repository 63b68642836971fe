//! Transfer engine wiring
//!
//! This module provides `TransferEngine`, which builds every component from
//! an explicit configuration and explicit stores, starts the worker tasks and
//! stops them again.
//!
//! # Architecture
//!
//! ```text
//! TransferEngine
//!     ├── MoneyTransferService        (façade handed to callers)
//!     ├── CallBridge ── CallQueue     (one FIFO per shard + result slots)
//!     ├── AccountBalanceManager × shard_count
//!     ├── TransactionProcessor × processor_count
//!     ├── Arc<dyn LedgerStore>
//!     └── Arc<dyn TransactionStore>
//! ```
//!
//! # Shutdown
//!
//! Shutdown runs in two phases. Processors stop first: each one finishes the
//! transaction it holds within the grace period while every shard manager is
//! still answering its calls. Shard managers stop after that. A worker that
//! misses its grace period is aborted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::account_manager::AccountBalanceManager;
use super::call_bridge::CallBridge;
use super::call_queue::CallQueue;
use super::ledger_store::InMemoryLedgerStore;
use super::processor::TransactionProcessor;
use super::service::{MoneyTransferService, CASH_DESK_IN, CASH_DESK_OUT};
use super::traits::{LedgerStore, TransactionStore};
use super::transaction_store::InMemoryTransactionStore;
use crate::config::EngineConfig;
use crate::types::{Account, LedgerError, TransferError};

/// Running set of shard managers and transaction processors
pub struct TransferEngine {
    config: EngineConfig,
    ledger: Arc<dyn LedgerStore>,
    store: Arc<dyn TransactionStore>,
    service: MoneyTransferService,
    /// Stops the transaction processors
    processors_cancel: CancellationToken,
    /// Stops the shard managers, only after the processors are gone
    managers_cancel: CancellationToken,
    processors: Vec<Worker>,
    managers: Vec<Worker>,
}

type Worker = (String, JoinHandle<()>);

impl TransferEngine {
    /// Start an engine over empty in-memory stores
    pub async fn start(config: EngineConfig) -> Result<Self, TransferError> {
        Self::start_with(
            config,
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
        )
        .await
    }

    /// Start an engine over the given stores
    ///
    /// Missing cash desks are created, and transactions that were taken but
    /// never committed are queued again before the processors start.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start_with(
        config: EngineConfig,
        ledger: Arc<dyn LedgerStore>,
        store: Arc<dyn TransactionStore>,
    ) -> Result<Self, TransferError> {
        let config = config.validated();
        create_cash_desk(ledger.as_ref(), Account::with_balance(CASH_DESK_IN, config.cash_desk_in_balance))?;
        create_cash_desk(ledger.as_ref(), Account::new(CASH_DESK_OUT))?;

        let queue = Arc::new(CallQueue::new(config.shard_count));
        let bridge = CallBridge::new(Arc::clone(&queue), config.call_timeout);
        let managers_cancel = CancellationToken::new();
        let processors_cancel = CancellationToken::new();
        let mut managers = Vec::with_capacity(config.shard_count);
        let mut processors = Vec::with_capacity(config.processor_count);

        for shard in 0..config.shard_count {
            let manager = AccountBalanceManager::new(
                shard,
                Arc::clone(&queue),
                Arc::clone(&ledger),
                config.poll_interval,
            );
            managers.push((
                format!("shard-{}", shard),
                tokio::spawn(manager.run(managers_cancel.clone())),
            ));
        }

        store.requeue_unprocessed().await;

        for worker in 0..config.processor_count {
            let processor = TransactionProcessor::new(
                worker,
                Arc::clone(&store),
                bridge.clone(),
                config.poll_interval,
            );
            processors.push((
                format!("processor-{}", worker),
                tokio::spawn(processor.run(processors_cancel.clone())),
            ));
        }

        let service =
            MoneyTransferService::new(&config, Arc::clone(&ledger), Arc::clone(&store), bridge);

        info!(
            shards = config.shard_count,
            processors = config.processor_count,
            "Transfer engine started"
        );

        Ok(TransferEngine {
            config,
            ledger,
            store,
            service,
            processors_cancel,
            managers_cancel,
            processors,
            managers,
        })
    }

    /// The façade; clones share this engine's workers
    pub fn service(&self) -> MoneyTransferService {
        self.service.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.ledger)
    }

    pub fn store(&self) -> Arc<dyn TransactionStore> {
        Arc::clone(&self.store)
    }

    /// Stop every worker
    ///
    /// Processors go first and may finish their in-flight transaction within
    /// `shutdown_grace`; the shard managers keep serving their calls until
    /// then. Managers are stopped next with the same grace. Stragglers are
    /// aborted.
    pub async fn shutdown(mut self) {
        let grace = self.config.shutdown_grace;

        self.processors_cancel.cancel();
        stop_workers(std::mem::take(&mut self.processors), grace).await;

        self.managers_cancel.cancel();
        stop_workers(std::mem::take(&mut self.managers), grace).await;

        info!("Transfer engine stopped");
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        // Workers exit on their own once the engine is gone
        self.processors_cancel.cancel();
        self.managers_cancel.cancel();
    }
}

async fn stop_workers(workers: Vec<Worker>, grace: Duration) {
    let stops = workers.into_iter().map(|(name, mut handle)| async move {
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => debug!(worker = %name, "Worker stopped"),
            Ok(Err(e)) => warn!(worker = %name, error = %e, "Worker ended abnormally"),
            Err(_) => {
                warn!(worker = %name, grace = ?grace, "Worker did not stop in time, aborting");
                handle.abort();
            }
        }
    });
    join_all(stops).await;
}

fn create_cash_desk(ledger: &dyn LedgerStore, account: Account) -> Result<(), LedgerError> {
    match ledger.create_account(account) {
        Ok(()) => Ok(()),
        Err(LedgerError::AccountAlreadyExists { account_id }) => {
            debug!(account_id = %account_id, "Cash desk already exists");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
