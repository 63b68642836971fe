//! Transaction Processor
//!
//! Drives every registered transfer through the saga below, persisting the
//! status after each single transition:
//!
//! ```text
//! CREATED ──reserve OK──────────────▶ RESERVED ──credit OK──▶ ADDED ──debit OK──▶ DONE
//!    │                                   │                     │
//!    ├─reserve DENIED/CANCELED─▶ DENIED  └─credit failed─▶ CANCELLING ──cancel OK──▶ DENIED
//!    ├─reserve DEBITED─────────▶ ERROR                      │             └─cancel failed─▶ ERROR
//!    └─reserve failed──────────▶ ERROR                      └─debit failed──▶ ERROR
//! ```
//!
//! # Recovery
//!
//! Processing starts from the last persisted status, never from `CREATED`.
//! Every step is safe to replay: reserve returns an existing reservation
//! unchanged and credits are deduplicated per transaction. Debit and cancel
//! reject a second application, so a failure of either is checked against
//! the reservation status before it is treated as fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::call_bridge::CallBridge;
use super::traits::TransactionStore;
use crate::types::{
    Call, ReservationStatus, StatusRecord, StoreError, Transaction, TransactionStatus,
};

/// Saga worker; any number of them may share one Transaction Store
pub struct TransactionProcessor {
    worker: usize,
    store: Arc<dyn TransactionStore>,
    bridge: CallBridge,
    poll_interval: Duration,
}

impl TransactionProcessor {
    pub fn new(
        worker: usize,
        store: Arc<dyn TransactionStore>,
        bridge: CallBridge,
        poll_interval: Duration,
    ) -> Self {
        TransactionProcessor {
            worker,
            store,
            bridge,
            poll_interval,
        }
    }

    /// Pull transactions until `cancel` fires
    ///
    /// A transaction already taken is driven to a final status before
    /// cancellation is checked again.
    pub async fn run(self, cancel: CancellationToken) {
        info!(worker = self.worker, "Transaction processor started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                transaction = self.store.get_next(self.poll_interval) => transaction,
            };

            let Some(transaction) = next else {
                continue;
            };

            if let Err(e) = self.process(&transaction).await {
                // Left uncommitted, so a requeue picks it up again
                error!(
                    worker = self.worker,
                    transaction_id = %transaction.id,
                    error = %e,
                    "Transaction processing aborted"
                );
            }
        }

        info!(worker = self.worker, "Transaction processor stopped");
    }

    /// Drive one transaction from its persisted status to a final one
    ///
    /// # Returns
    ///
    /// The final status, after it has been persisted and the transaction
    /// committed.
    ///
    /// # Errors
    ///
    /// Only Transaction Store failures; call failures become transitions.
    pub async fn process(&self, transaction: &Transaction) -> Result<StatusRecord, StoreError> {
        let (_, mut current) = self.store.get(transaction.id).await?;
        debug!(
            worker = self.worker,
            transaction_id = %transaction.id,
            status = %current,
            "Processing transaction"
        );

        while !current.is_final() {
            let next = self.step(transaction, &current).await;
            self.store.update_status(transaction.id, next.clone()).await?;
            debug!(
                worker = self.worker,
                transaction_id = %transaction.id,
                from = %current.status,
                to = %next,
                "Transition persisted"
            );
            current = next;
        }

        self.store.commit_processed(transaction.id).await?;

        match current.status {
            TransactionStatus::Error => warn!(
                worker = self.worker,
                transaction_id = %transaction.id,
                status = %current,
                "Transaction failed"
            ),
            _ => info!(
                worker = self.worker,
                transaction_id = %transaction.id,
                status = %current,
                "Transaction finished"
            ),
        }
        Ok(current)
    }

    /// Compute the status following `current`; does not persist it
    pub async fn step(&self, transaction: &Transaction, current: &StatusRecord) -> StatusRecord {
        match current.status {
            TransactionStatus::Created => self.reserve(transaction).await,
            TransactionStatus::Reserved => self.credit(transaction).await,
            TransactionStatus::Added => self.debit(transaction).await,
            TransactionStatus::Cancelling => self.cancel(transaction, current).await,
            TransactionStatus::Done | TransactionStatus::Denied | TransactionStatus::Error => {
                current.clone()
            }
        }
    }

    async fn reserve(&self, transaction: &Transaction) -> StatusRecord {
        let call = Call::reserve_amount(
            transaction.account_id_from.as_str(),
            transaction.id,
            transaction.amount,
        );

        match self.bridge.submit(call).await.into_reservation() {
            Ok((ReservationStatus::Ok, _)) => StatusRecord::new(TransactionStatus::Reserved),
            Ok((ReservationStatus::Denied, reason)) => StatusRecord {
                status: TransactionStatus::Denied,
                reason,
            },
            Ok((ReservationStatus::Canceled, reason)) => StatusRecord::with_reason(
                TransactionStatus::Denied,
                reason.unwrap_or_else(|| "Reservation was canceled".to_string()),
            ),
            // Money left the source before the credit step ever ran
            Ok((ReservationStatus::Debited, _)) => StatusRecord::with_reason(
                TransactionStatus::Error,
                format!(
                    "Reservation on account {} was already debited",
                    transaction.account_id_from
                ),
            ),
            Err(e) => StatusRecord::with_reason(TransactionStatus::Error, e.to_string()),
        }
    }

    async fn credit(&self, transaction: &Transaction) -> StatusRecord {
        let call = Call::add_amount(
            transaction.account_id_to.as_str(),
            Some(transaction.id),
            transaction.amount,
        );

        match self.bridge.submit(call).await.into_completed() {
            Ok(()) => StatusRecord::new(TransactionStatus::Added),
            Err(e) => StatusRecord::with_reason(TransactionStatus::Cancelling, e.to_string()),
        }
    }

    async fn debit(&self, transaction: &Transaction) -> StatusRecord {
        let call = Call::debit_reserved_amount(transaction.account_id_from.as_str(), transaction.id);

        match self.bridge.submit(call).await.into_completed() {
            Ok(()) => StatusRecord::new(TransactionStatus::Done),
            Err(e) => {
                if self.already(transaction, ReservationStatus::Debited).await {
                    debug!(transaction_id = %transaction.id, error = %e, "Debit was already applied");
                    StatusRecord::new(TransactionStatus::Done)
                } else {
                    StatusRecord::with_reason(TransactionStatus::Error, e.to_string())
                }
            }
        }
    }

    /// Compensate a failed credit; the denial keeps the credit failure reason
    async fn cancel(&self, transaction: &Transaction, current: &StatusRecord) -> StatusRecord {
        let call =
            Call::cancel_reserved_amount(transaction.account_id_from.as_str(), transaction.id);
        let denied = StatusRecord {
            status: TransactionStatus::Denied,
            reason: current.reason.clone(),
        };

        match self.bridge.submit(call).await.into_completed() {
            Ok(()) => denied,
            Err(e) => {
                if self.already(transaction, ReservationStatus::Canceled).await {
                    debug!(transaction_id = %transaction.id, error = %e, "Cancel was already applied");
                    denied
                } else {
                    StatusRecord::with_reason(TransactionStatus::Error, e.to_string())
                }
            }
        }
    }

    /// Whether the source reservation already reached `expected`
    async fn already(&self, transaction: &Transaction, expected: ReservationStatus) -> bool {
        let call =
            Call::get_reservation_status(transaction.account_id_from.as_str(), transaction.id);

        match self.bridge.submit(call).await.into_reservation() {
            Ok((status, _)) => status == expected,
            Err(e) => {
                debug!(transaction_id = %transaction.id, error = %e, "Reservation status unavailable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account_manager::AccountBalanceManager;
    use crate::core::call_queue::CallQueue;
    use crate::core::ledger_store::InMemoryLedgerStore;
    use crate::core::traits::LedgerStore;
    use crate::core::transaction_store::InMemoryTransactionStore;
    use crate::types::{Account, AccountId, LedgerError, Reservation, TransactionId};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    const POLL: Duration = Duration::from_millis(10);

    /// Ledger whose credit records fail for one account
    struct CreditFailingLedger {
        inner: InMemoryLedgerStore,
        broken: AccountId,
    }

    impl LedgerStore for CreditFailingLedger {
        fn create_account(&self, account: Account) -> Result<(), LedgerError> {
            self.inner.create_account(account)
        }
        fn account_ids(&self) -> Vec<AccountId> {
            self.inner.account_ids()
        }
        fn get_account(&self, account_id: &str) -> Result<Account, LedgerError> {
            self.inner.get_account(account_id)
        }
        fn save_reservation(&self, reservation: Reservation) -> Result<(), LedgerError> {
            self.inner.save_reservation(reservation)
        }
        fn find_reservation(
            &self,
            account_id: &str,
            transaction_id: TransactionId,
        ) -> Result<Option<Reservation>, LedgerError> {
            self.inner.find_reservation(account_id, transaction_id)
        }
        fn reservations_with_status_ok(&self, account_id: &str) -> Result<Vec<Reservation>, LedgerError> {
            self.inner.reservations_with_status_ok(account_id)
        }
        fn update_balance_and_reservation_status(
            &self,
            account_id: &str,
            transaction_id: TransactionId,
            balance: Decimal,
            status: ReservationStatus,
        ) -> Result<(), LedgerError> {
            self.inner
                .update_balance_and_reservation_status(account_id, transaction_id, balance, status)
        }
        fn update_reservation_status(
            &self,
            account_id: &str,
            transaction_id: TransactionId,
            status: ReservationStatus,
        ) -> Result<(), LedgerError> {
            self.inner
                .update_reservation_status(account_id, transaction_id, status)
        }
        fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<(), LedgerError> {
            self.inner.update_balance(account_id, balance)
        }
        fn find_credit(
            &self,
            account_id: &str,
            transaction_id: TransactionId,
        ) -> Result<Option<Decimal>, LedgerError> {
            if account_id == self.broken {
                return Err(LedgerError::account_not_found(account_id));
            }
            self.inner.find_credit(account_id, transaction_id)
        }
        fn update_balance_with_credit(
            &self,
            account_id: &str,
            transaction_id: TransactionId,
            amount: Decimal,
            balance: Decimal,
        ) -> Result<(), LedgerError> {
            self.inner
                .update_balance_with_credit(account_id, transaction_id, amount, balance)
        }
    }

    /// Transaction store recording every persisted transition
    struct RecordingStore {
        inner: InMemoryTransactionStore,
        transitions: Mutex<Vec<TransactionStatus>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            RecordingStore {
                inner: InMemoryTransactionStore::new(),
                transitions: Mutex::new(Vec::new()),
            }
        }

        fn transitions(&self) -> Vec<TransactionStatus> {
            self.transitions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionStore for RecordingStore {
        async fn save_new(&self, transaction: Transaction) -> Result<(), StoreError> {
            self.inner.save_new(transaction).await
        }
        async fn get(
            &self,
            transaction_id: TransactionId,
        ) -> Result<(Transaction, StatusRecord), StoreError> {
            self.inner.get(transaction_id).await
        }
        async fn update_status(
            &self,
            transaction_id: TransactionId,
            status: StatusRecord,
        ) -> Result<(), StoreError> {
            self.transitions.lock().unwrap().push(status.status);
            self.inner.update_status(transaction_id, status).await
        }
        async fn wait_for_status(
            &self,
            transaction_id: TransactionId,
            previous: TransactionStatus,
            timeout: Duration,
        ) -> Result<StatusRecord, StoreError> {
            self.inner
                .wait_for_status(transaction_id, previous, timeout)
                .await
        }
        async fn get_next(&self, timeout: Duration) -> Option<Transaction> {
            self.inner.get_next(timeout).await
        }
        async fn commit_processed(&self, transaction_id: TransactionId) -> Result<(), StoreError> {
            self.inner.commit_processed(transaction_id).await
        }
        async fn requeue_unprocessed(&self) -> usize {
            self.inner.requeue_unprocessed().await
        }
    }

    struct Harness {
        ledger: Arc<dyn LedgerStore>,
        store: Arc<RecordingStore>,
        bridge: CallBridge,
        cancel: CancellationToken,
    }

    impl Harness {
        fn start(ledger: Arc<dyn LedgerStore>, accounts: &[(&str, i64)]) -> Self {
            for (id, balance) in accounts {
                ledger
                    .create_account(Account::with_balance(*id, Decimal::from(*balance)))
                    .unwrap();
            }

            let shard_count = 2;
            let queue = Arc::new(CallQueue::new(shard_count));
            let cancel = CancellationToken::new();
            for shard in 0..shard_count {
                let manager =
                    AccountBalanceManager::new(shard, queue.clone(), ledger.clone(), POLL);
                tokio::spawn(manager.run(cancel.clone()));
            }

            Harness {
                ledger,
                store: Arc::new(RecordingStore::new()),
                bridge: CallBridge::new(queue, Duration::from_secs(5)),
                cancel,
            }
        }

        fn with_accounts(accounts: &[(&str, i64)]) -> Self {
            Self::start(Arc::new(InMemoryLedgerStore::new()), accounts)
        }

        fn processor(&self) -> TransactionProcessor {
            TransactionProcessor::new(0, self.store.clone(), self.bridge.clone(), POLL)
        }

        async fn register(&self, from: &str, to: &str, amount: i64) -> Transaction {
            let transaction = Transaction::new(from, to, Decimal::from(amount));
            self.store.save_new(transaction.clone()).await.unwrap();
            // Taken off the queue the way the run loop would
            self.store.get_next(POLL).await.unwrap();
            transaction
        }

        fn balance(&self, account_id: &str) -> Decimal {
            self.ledger.get_account(account_id).unwrap().balance
        }

        fn reservation(&self, account_id: &str, transaction_id: TransactionId) -> ReservationStatus {
            self.ledger
                .find_reservation(account_id, transaction_id)
                .unwrap()
                .unwrap()
                .status
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    #[tokio::test]
    async fn test_successful_transfer_walks_every_step() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 30).await;

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status, StatusRecord::new(TransactionStatus::Done));
        assert_eq!(
            harness.store.transitions(),
            vec![
                TransactionStatus::Reserved,
                TransactionStatus::Added,
                TransactionStatus::Done
            ]
        );
        assert_eq!(harness.balance("a"), Decimal::from(70));
        assert_eq!(harness.balance("b"), Decimal::from(30));
        assert_eq!(harness.reservation("a", transaction.id), ReservationStatus::Debited);
        assert_eq!(harness.store.inner.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_denied_with_reason() {
        let harness = Harness::with_accounts(&[("c", 10), ("b", 100)]);
        let transaction = harness.register("c", "b", 50).await;

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status.status, TransactionStatus::Denied);
        assert!(status.reason.unwrap().contains("Insufficient available balance"));
        assert_eq!(harness.balance("c"), Decimal::TEN);
        assert_eq!(harness.balance("b"), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_credit_failure_is_compensated() {
        let ledger = Arc::new(CreditFailingLedger {
            inner: InMemoryLedgerStore::new(),
            broken: "b".to_string(),
        });
        let harness = Harness::start(ledger, &[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 30).await;

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(
            harness.store.transitions(),
            vec![
                TransactionStatus::Reserved,
                TransactionStatus::Cancelling,
                TransactionStatus::Denied
            ]
        );
        assert_eq!(status.status, TransactionStatus::Denied);
        assert!(status.reason.is_some());
        assert_eq!(harness.reservation("a", transaction.id), ReservationStatus::Canceled);
        assert_eq!(harness.balance("a"), Decimal::from(100));
        assert_eq!(harness.balance("b"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_source_account_is_an_error() {
        let harness = Harness::with_accounts(&[("b", 0)]);
        let transaction = harness.register("ghost", "b", 1).await;

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status.status, TransactionStatus::Error);
        assert!(status.reason.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_resumes_from_persisted_status() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 10).await;

        // Crash after the reservation was persisted
        harness
            .bridge
            .submit(Call::reserve_amount("a", transaction.id, transaction.amount))
            .await
            .into_reservation()
            .unwrap();
        harness
            .store
            .update_status(transaction.id, StatusRecord::new(TransactionStatus::Reserved))
            .await
            .unwrap();

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status.status, TransactionStatus::Done);
        assert_eq!(
            harness.store.transitions(),
            vec![
                TransactionStatus::Reserved,
                TransactionStatus::Added,
                TransactionStatus::Done
            ]
        );
        assert_eq!(harness.balance("a"), Decimal::from(90));
        assert_eq!(harness.balance("b"), Decimal::TEN);
    }

    #[tokio::test]
    async fn test_replayed_debit_resolves_to_done() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 10).await;

        // Crash after the debit ran but before DONE was persisted
        for call in [
            Call::reserve_amount("a", transaction.id, transaction.amount),
            Call::add_amount("b", Some(transaction.id), transaction.amount),
            Call::debit_reserved_amount("a", transaction.id),
        ] {
            assert!(!harness.bridge.submit(call).await.is_error());
        }
        for status in [TransactionStatus::Reserved, TransactionStatus::Added] {
            harness
                .store
                .update_status(transaction.id, StatusRecord::new(status))
                .await
                .unwrap();
        }

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status.status, TransactionStatus::Done);
        assert_eq!(harness.balance("a"), Decimal::from(90));
        assert_eq!(harness.balance("b"), Decimal::TEN);
    }

    #[tokio::test]
    async fn test_reservation_debited_before_credit_is_an_error() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 10).await;

        for call in [
            Call::reserve_amount("a", transaction.id, transaction.amount),
            Call::debit_reserved_amount("a", transaction.id),
        ] {
            assert!(!harness.bridge.submit(call).await.is_error());
        }

        let status = harness.processor().process(&transaction).await.unwrap();

        assert_eq!(status.status, TransactionStatus::Error);
        assert_eq!(harness.store.transitions(), vec![TransactionStatus::Error]);
        assert_eq!(harness.balance("b"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_final_transaction_is_only_committed() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let transaction = harness.register("a", "b", 10).await;
        let processor = harness.processor();

        processor.process(&transaction).await.unwrap();
        let again = processor.process(&transaction).await.unwrap();

        assert_eq!(again.status, TransactionStatus::Done);
        assert_eq!(harness.store.transitions().len(), 3);
        assert_eq!(harness.balance("a"), Decimal::from(90));
    }

    #[tokio::test]
    async fn test_run_loop_processes_queue_until_cancelled() {
        let harness = Harness::with_accounts(&[("a", 100), ("b", 0)]);
        let cancel = CancellationToken::new();
        let workers: Vec<_> = (0..2)
            .map(|worker| {
                let processor = TransactionProcessor::new(
                    worker,
                    harness.store.clone(),
                    harness.bridge.clone(),
                    POLL,
                );
                tokio::spawn(processor.run(cancel.clone()))
            })
            .collect();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let transaction = Transaction::new("a", "b", Decimal::ONE);
            ids.push(transaction.id);
            harness.store.save_new(transaction).await.unwrap();
        }
        for id in ids {
            let mut status = StatusRecord::created();
            while !status.is_final() {
                status = harness
                    .store
                    .wait_for_status(id, status.status, Duration::from_secs(5))
                    .await
                    .unwrap();
            }
            assert_eq!(status.status, TransactionStatus::Done);
        }

        cancel.cancel();
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(harness.balance("a"), Decimal::from(95));
        assert_eq!(harness.balance("b"), Decimal::from(5));
    }
}
