//! In-memory Transaction Store
//!
//! This module provides `InMemoryTransactionStore`, the durable log of
//! registered transfers, their status history head, and the work queue the
//! Transaction Processors pull from.
//!
//! # Design
//!
//! Every transaction row pairs the immutable `Transaction` with a `watch`
//! channel carrying its current `StatusRecord`. Persisting a transition
//! replaces the value and wakes every waiter on that transaction, so
//! `wait_for_status` never polls.
//!
//! The work queue is a FIFO of transaction ids fed by `save_new`. A handed
//! out id is tracked as in flight until `commit_processed`;
//! `requeue_unprocessed` puts in-flight ids back, oldest first. Delivery is
//! therefore at-least-once, which the processor tolerates because it resumes
//! from the persisted status.
//!
//! # Thread Safety
//!
//! All operations are safe to call concurrently. The receiving end of the
//! queue is shared by every processor behind an async mutex, so each id is
//! handed to exactly one of them per delivery.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

use super::traits::TransactionStore;
use crate::types::{StatusRecord, StoreError, Transaction, TransactionId, TransactionStatus};

#[derive(Debug)]
struct TransactionRow {
    transaction: Transaction,
    status: watch::Sender<StatusRecord>,
}

/// Thread-safe in-memory transaction log and work queue
#[derive(Debug)]
pub struct InMemoryTransactionStore {
    transactions: DashMap<TransactionId, TransactionRow>,
    queue_tx: mpsc::UnboundedSender<TransactionId>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<TransactionId>>,
    /// Handed out by `get_next` but not yet committed
    in_flight: DashSet<TransactionId>,
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        InMemoryTransactionStore {
            transactions: DashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            in_flight: DashSet::new(),
        }
    }

    /// Number of registered transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of transactions handed out and not yet committed
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn status_sender(
        &self,
        transaction_id: TransactionId,
    ) -> Result<watch::Sender<StatusRecord>, StoreError> {
        self.transactions
            .get(&transaction_id)
            .map(|row| row.status.clone())
            .ok_or_else(|| StoreError::transaction_not_found(transaction_id))
    }

    fn enqueue(&self, transaction_id: TransactionId) {
        // The receiver lives as long as the store
        let _ = self.queue_tx.send(transaction_id);
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn save_new(&self, transaction: Transaction) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        let transaction_id = transaction.id;
        match self.transactions.entry(transaction_id) {
            Entry::Occupied(_) => return Err(StoreError::duplicate_transaction(transaction_id)),
            Entry::Vacant(entry) => {
                let (status, _) = watch::channel(StatusRecord::created());
                entry.insert(TransactionRow {
                    transaction,
                    status,
                });
            }
        }

        self.enqueue(transaction_id);
        debug!(transaction_id = %transaction_id, "Transaction registered");
        Ok(())
    }

    async fn get(
        &self,
        transaction_id: TransactionId,
    ) -> Result<(Transaction, StatusRecord), StoreError> {
        self.transactions
            .get(&transaction_id)
            .map(|row| (row.transaction.clone(), row.status.borrow().clone()))
            .ok_or_else(|| StoreError::transaction_not_found(transaction_id))
    }

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        status: StatusRecord,
    ) -> Result<(), StoreError> {
        let sender = self.status_sender(transaction_id)?;
        let next = status.status;

        // Check and write under the channel's lock, so two writers racing on
        // a redelivered transaction cannot both leave a final status
        let mut previous = next;
        let written = sender.send_if_modified(|current| {
            previous = current.status;
            if current.is_final() {
                return false;
            }
            *current = status;
            true
        });

        if !written {
            return Err(StoreError::TransitionFromFinal {
                transaction_id,
                status: previous,
                next,
            });
        }

        debug!(
            transaction_id = %transaction_id,
            from = %previous,
            to = %next,
            "Transaction status updated"
        );
        Ok(())
    }

    async fn wait_for_status(
        &self,
        transaction_id: TransactionId,
        previous: TransactionStatus,
        timeout: Duration,
    ) -> Result<StatusRecord, StoreError> {
        let mut rx = self.status_sender(transaction_id)?.subscribe();

        let changed = tokio::time::timeout(timeout, rx.wait_for(|record| record.status != previous))
            .await
            .ok()
            .and_then(Result::ok)
            .map(|record| record.clone());

        Ok(changed.unwrap_or_else(|| rx.borrow().clone()))
    }

    async fn get_next(&self, timeout: Duration) -> Option<Transaction> {
        let transaction_id = {
            let mut rx = self.queue_rx.lock().await;
            tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()?
        };

        let transaction = self
            .transactions
            .get(&transaction_id)
            .map(|row| row.transaction.clone())?;
        self.in_flight.insert(transaction_id);
        Some(transaction)
    }

    async fn commit_processed(&self, transaction_id: TransactionId) -> Result<(), StoreError> {
        if !self.transactions.contains_key(&transaction_id) {
            return Err(StoreError::transaction_not_found(transaction_id));
        }
        self.in_flight.remove(&transaction_id);
        debug!(transaction_id = %transaction_id, "Transaction committed");
        Ok(())
    }

    async fn requeue_unprocessed(&self) -> usize {
        let mut pending: Vec<TransactionId> = self.in_flight.iter().map(|id| *id).collect();
        pending.sort();

        for transaction_id in &pending {
            self.in_flight.remove(transaction_id);
            self.enqueue(*transaction_id);
        }

        if !pending.is_empty() {
            info!(count = pending.len(), "Requeued unprocessed transactions");
        }
        pending.len()
    }
}
