//! Synchronous call bridge
//!
//! Presents the queue-based Account Balance Managers as a single
//! "submit and wait for the result" operation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::call_queue::CallQueue;
use super::shard::shard_index;
use crate::types::{Call, CallResult};

/// Routes calls to the owning shard and waits for their results
///
/// Cloning is cheap; every clone shares the same queues.
#[derive(Debug, Clone)]
pub struct CallBridge {
    queue: Arc<CallQueue>,
    timeout: Duration,
}

impl CallBridge {
    /// Create a bridge over `queue` that waits at most `timeout` per call
    pub fn new(queue: Arc<CallQueue>, timeout: Duration) -> Self {
        Self { queue, timeout }
    }

    /// Shard owning an account
    pub fn shard_of(&self, account_id: &str) -> usize {
        shard_index(account_id, self.queue.shard_count())
    }

    /// Submit a call and wait for its result
    ///
    /// Never fails by itself: enqueue errors and timeouts come back as a
    /// failed `CallResult`. A timed-out call has an unknown outcome, the
    /// manager may still execute it.
    pub async fn submit(&self, call: Call) -> CallResult {
        let shard = self.shard_of(&call.account_id);
        let call_id = call.id;
        debug!(
            call_id = %call_id,
            call_type = %call.call_type,
            account_id = %call.account_id,
            shard,
            "Submitting call"
        );

        if let Err(e) = self.queue.enqueue(call, shard) {
            warn!(call_id = %call_id, shard, error = %e, "Call could not be queued");
            return CallResult::failure(call_id, e);
        }

        let result = self.queue.await_result(call_id, self.timeout).await;
        if let Err(e) = &result.outcome {
            warn!(call_id = %call_id, error = %e, "Call failed");
        }
        result
    }
}
