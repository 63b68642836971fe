//! Per-shard call queues and per-call result slots
//!
//! This is the only channel between the Call Bridge and the Account Balance
//! Managers:
//!
//! ```text
//! CallBridge ──enqueue──▶ shard queue (FIFO) ──dequeue_next──▶ AccountBalanceManager
//!     ▲                                                              │
//!     └────────await_result◀── result slot (one per call) ◀──post_result
//! ```
//!
//! # Design
//!
//! Each shard has an unbounded FIFO channel; its receiver is only ever used
//! by that shard's manager. Each pending call owns a `watch` slot that starts
//! empty and is written exactly once. The waiter blocks on the slot with a
//! timeout, so there is no polling. A slot is removed as soon as its waiter
//! has observed the result, given up, or been dropped.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use crate::types::{Call, CallError, CallId, CallResult};

/// Queues and result slots shared by the bridge and the shard managers
#[derive(Debug)]
pub struct CallQueue {
    senders: Vec<mpsc::UnboundedSender<Call>>,
    /// Locked only by the single manager of each shard
    receivers: Vec<Mutex<mpsc::UnboundedReceiver<Call>>>,
    results: DashMap<CallId, watch::Sender<Option<CallResult>>>,
}

impl CallQueue {
    /// Create one queue per shard
    pub fn new(shard_count: usize) -> Self {
        let (senders, receivers) = (0..shard_count)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Mutex::new(rx))
            })
            .unzip();

        Self {
            senders,
            receivers,
            results: DashMap::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    /// Number of calls still waiting for a result
    pub fn pending_results(&self) -> usize {
        self.results.len()
    }

    fn check_shard(&self, shard: usize) -> Result<(), CallError> {
        if shard < self.shard_count() {
            Ok(())
        } else {
            Err(CallError::InvalidShard {
                shard,
                shard_count: self.shard_count(),
            })
        }
    }

    /// Append a call to a shard queue and open its result slot
    pub fn enqueue(&self, call: Call, shard: usize) -> Result<(), CallError> {
        self.check_shard(shard)?;

        let call_id = call.id;
        let (slot, _) = watch::channel(None);
        self.results.insert(call_id, slot);

        if self.senders[shard].send(call).is_err() {
            self.results.remove(&call_id);
            return Err(CallError::QueueClosed { shard });
        }
        Ok(())
    }

    /// Take the next call of a shard, or `None` once `timeout` elapses
    pub async fn dequeue_next(&self, shard: usize, timeout: Duration) -> Option<Call> {
        let receiver = self.receivers.get(shard)?;
        let mut receiver = receiver.lock().await;
        tokio::time::timeout(timeout, receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Write the result of a call; a slot accepts exactly one result
    pub fn post_result(&self, result: CallResult) -> Result<(), CallError> {
        let call_id = result.call_id;
        let slot = self
            .results
            .get(&call_id)
            .ok_or(CallError::UnknownCall { call_id })?;

        let written = slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(result);
            true
        });

        if written {
            Ok(())
        } else {
            Err(CallError::ResultAlreadyPosted { call_id })
        }
    }

    /// Block until the result of a call is posted or `timeout` elapses
    ///
    /// A timeout is reported as a failed result; the manager may still
    /// execute the call later, its result is then discarded. The slot is
    /// released on every exit, including when this future is dropped.
    pub async fn await_result(&self, call_id: CallId, timeout: Duration) -> CallResult {
        let mut rx = match self.results.get(&call_id) {
            Some(slot) => slot.subscribe(),
            None => return CallResult::failure(call_id, CallError::UnknownCall { call_id }),
        };
        let _slot = SlotGuard {
            results: &self.results,
            call_id,
        };

        let posted = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.clone(),
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(call_id = %call_id, waited = ?timeout, "Call result not received in time");
                return CallResult::failure(call_id, CallError::timeout(call_id, timeout));
            }
        };

        debug!(call_id = %call_id, "Call result received");
        posted.unwrap_or_else(|| CallResult::failure(call_id, CallError::UnknownCall { call_id }))
    }
}

/// Removes a result slot when its waiter goes away
struct SlotGuard<'a> {
    results: &'a DashMap<CallId, watch::Sender<Option<CallResult>>>,
    call_id: CallId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.results.remove(&self.call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallValue, TransactionId};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_calls_are_dequeued_in_fifo_order() {
        let queue = CallQueue::new(2);
        let first = Call::get_available_balance("a");
        let second = Call::reserve_amount("a", TransactionId::new(), Decimal::ONE);
        let (first_id, second_id) = (first.id, second.id);

        queue.enqueue(first, 1).unwrap();
        queue.enqueue(second, 1).unwrap();

        assert_eq!(queue.dequeue_next(1, SHORT).await.unwrap().id, first_id);
        assert_eq!(queue.dequeue_next(1, SHORT).await.unwrap().id, second_id);
        assert!(queue.dequeue_next(1, SHORT).await.is_none());
    }

    #[tokio::test]
    async fn test_shards_are_independent() {
        let queue = CallQueue::new(2);
        queue.enqueue(Call::get_available_balance("a"), 0).unwrap();

        assert!(queue.dequeue_next(1, SHORT).await.is_none());
        assert!(queue.dequeue_next(0, SHORT).await.is_some());
    }

    #[test]
    fn test_enqueue_rejects_unknown_shard() {
        let queue = CallQueue::new(2);
        let result = queue.enqueue(Call::get_available_balance("a"), 5);
        assert_eq!(
            result,
            Err(CallError::InvalidShard {
                shard: 5,
                shard_count: 2
            })
        );
        assert_eq!(queue.pending_results(), 0);
    }

    #[tokio::test]
    async fn test_result_posted_before_wait_is_observed() {
        let queue = CallQueue::new(1);
        let call = Call::get_available_balance("a");
        let call_id = call.id;
        queue.enqueue(call, 0).unwrap();

        queue
            .post_result(CallResult::success(call_id, CallValue::Amount(Decimal::TEN)))
            .unwrap();
        let result = queue.await_result(call_id, SHORT).await;

        assert_eq!(result.into_amount(), Ok(Decimal::TEN));
        assert_eq!(queue.pending_results(), 0);
    }

    #[tokio::test]
    async fn test_waiter_is_woken_by_worker() {
        let queue = Arc::new(CallQueue::new(1));
        let call = Call::get_available_balance("a");
        let call_id = call.id;
        queue.enqueue(call, 0).unwrap();

        let worker_queue = Arc::clone(&queue);
        let worker = tokio::spawn(async move {
            let call = worker_queue.dequeue_next(0, Duration::from_secs(1)).await.unwrap();
            worker_queue
                .post_result(CallResult::success(call.id, CallValue::Completed))
                .unwrap();
        });

        let result = queue.await_result(call_id, Duration::from_secs(5)).await;
        worker.await.unwrap();
        assert_eq!(result.into_completed(), Ok(()));
    }

    #[test]
    fn test_result_slot_is_written_once() {
        let queue = CallQueue::new(1);
        let call = Call::get_available_balance("a");
        let call_id = call.id;
        queue.enqueue(call, 0).unwrap();

        queue
            .post_result(CallResult::success(call_id, CallValue::Completed))
            .unwrap();
        let second = queue.post_result(CallResult::success(call_id, CallValue::Completed));

        assert_eq!(second, Err(CallError::ResultAlreadyPosted { call_id }));
    }

    #[tokio::test]
    async fn test_timeout_reports_failure_and_discards_late_result() {
        let queue = CallQueue::new(1);
        let call = Call::get_available_balance("a");
        let call_id = call.id;
        queue.enqueue(call, 0).unwrap();

        let result = queue.await_result(call_id, SHORT).await;
        assert!(matches!(
            result.outcome,
            Err(CallError::Timeout { .. })
        ));

        let late = queue.post_result(CallResult::success(call_id, CallValue::Completed));
        assert_eq!(late, Err(CallError::UnknownCall { call_id }));
    }

    #[tokio::test]
    async fn test_dropped_waiter_releases_its_slot() {
        let queue = CallQueue::new(1);
        let call = Call::get_available_balance("a");
        let call_id = call.id;
        queue.enqueue(call, 0).unwrap();
        assert_eq!(queue.pending_results(), 1);

        // The outer timeout drops the wait while it is still pending
        let abandoned =
            tokio::time::timeout(SHORT, queue.await_result(call_id, Duration::from_secs(60))).await;

        assert!(abandoned.is_err());
        assert_eq!(queue.pending_results(), 0);
    }
}
