//! Account Balance Manager
//!
//! This module provides the `AccountBalanceManager`, the single worker that
//! owns every account of one shard and executes the balance calls routed to
//! that shard.
//!
//! The manager is responsible for:
//! - Draining its shard queue in FIFO order
//! - Computing available balances (balance minus `Ok` reservations)
//! - Reserving, debiting and cancelling amounts per (account, transaction)
//! - Crediting accounts, at most once per (account, transaction)
//! - Posting exactly one result for every call it takes
//!
//! # Thread Safety
//!
//! Exactly one manager runs per shard, so calls touching the same account are
//! executed one at a time without any lock above the Ledger Store.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::call_queue::CallQueue;
use super::traits::LedgerStore;
use crate::types::{
    Call, CallError, CallResult, CallType, CallValue, LedgerError, Reservation, ReservationStatus,
    TransactionId,
};

/// Worker executing the balance calls of one shard
pub struct AccountBalanceManager {
    shard: usize,
    queue: Arc<CallQueue>,
    ledger: Arc<dyn LedgerStore>,
    /// Upper bound on a single queue wait, so shutdown is noticed promptly
    poll_interval: Duration,
}

impl AccountBalanceManager {
    /// Create the manager of `shard`
    ///
    /// # Arguments
    ///
    /// * `shard` - Index of the shard this manager owns
    /// * `queue` - Queues shared with the Call Bridge
    /// * `ledger` - Storage for accounts, reservations and credits
    /// * `poll_interval` - Maximum time a single queue wait blocks
    pub fn new(
        shard: usize,
        queue: Arc<CallQueue>,
        ledger: Arc<dyn LedgerStore>,
        poll_interval: Duration,
    ) -> Self {
        AccountBalanceManager {
            shard,
            queue,
            ledger,
            poll_interval,
        }
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Drain the shard queue until `cancel` fires
    ///
    /// A call that is already taken from the queue is always executed and
    /// answered before the loop checks for cancellation again.
    pub async fn run(self, cancel: CancellationToken) {
        info!(shard = self.shard, "Account balance manager started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                call = self.queue.dequeue_next(self.shard, self.poll_interval) => call,
            };

            let Some(call) = next else {
                continue;
            };

            let result = self.execute(&call);
            if let Err(e) = self.queue.post_result(result) {
                // The submitter gave up waiting; the call still took effect
                debug!(shard = self.shard, call_id = %call.id, error = %e, "Call result discarded");
            }
        }

        info!(shard = self.shard, "Account balance manager stopped");
    }

    /// Execute one call against the ledger
    ///
    /// Never fails: every error is turned into a failed `CallResult`.
    pub fn execute(&self, call: &Call) -> CallResult {
        debug!(
            shard = self.shard,
            call_id = %call.id,
            call_type = %call.call_type,
            account_id = %call.account_id,
            "Executing call"
        );

        match self.dispatch(call) {
            Ok(value) => CallResult::success(call.id, value),
            Err(e) => {
                warn!(
                    shard = self.shard,
                    call_id = %call.id,
                    call_type = %call.call_type,
                    account_id = %call.account_id,
                    error = %e,
                    "Call execution failed"
                );
                CallResult::failure(call.id, CallError::execution(call.id, e))
            }
        }
    }

    fn dispatch(&self, call: &Call) -> Result<CallValue, LedgerError> {
        let account_id = call.account_id.as_str();

        match call.call_type {
            CallType::GetAvailableBalance => {
                self.available_balance(account_id).map(CallValue::Amount)
            }
            CallType::ReserveAmount => {
                let transaction_id = require(call, call.transaction_id, "transaction id")?;
                let amount = require(call, call.amount, "amount")?;
                self.reserve(account_id, transaction_id, amount)
            }
            CallType::DebitReservedAmount => {
                let transaction_id = require(call, call.transaction_id, "transaction id")?;
                self.debit(account_id, transaction_id)?;
                Ok(CallValue::Completed)
            }
            CallType::CancelReservedAmount => {
                let transaction_id = require(call, call.transaction_id, "transaction id")?;
                self.cancel(account_id, transaction_id)?;
                Ok(CallValue::Completed)
            }
            CallType::AddAmount => {
                let amount = require(call, call.amount, "amount")?;
                self.add(account_id, call.transaction_id, amount)?;
                Ok(CallValue::Completed)
            }
            CallType::GetReservationStatus => {
                let transaction_id = require(call, call.transaction_id, "transaction id")?;
                let reservation = self.existing_reservation(account_id, transaction_id)?;
                Ok(CallValue::Reservation {
                    status: reservation.status,
                    reason: None,
                })
            }
        }
    }

    /// Balance minus the sum of reservations still in status `Ok`
    fn available_balance(&self, account_id: &str) -> Result<Decimal, LedgerError> {
        let account = self.ledger.get_account(account_id)?;
        let reserved = self
            .ledger
            .reservations_with_status_ok(account_id)?
            .iter()
            .try_fold(Decimal::ZERO, |sum, reservation| sum.checked_add(reservation.amount))
            .ok_or_else(|| LedgerError::arithmetic_overflow("available_balance", account_id))?;

        account
            .balance
            .checked_sub(reserved)
            .ok_or_else(|| LedgerError::arithmetic_underflow("available_balance", account_id))
    }

    /// Set `amount` aside for a transaction
    ///
    /// A reservation that already exists is reported unchanged. A denial
    /// stores nothing, so a later retry is evaluated afresh.
    fn reserve(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
        amount: Decimal,
    ) -> Result<CallValue, LedgerError> {
        if let Some(existing) = self.ledger.find_reservation(account_id, transaction_id)? {
            debug!(
                shard = self.shard,
                account_id,
                transaction_id = %transaction_id,
                status = %existing.status,
                "Reservation already exists"
            );
            return Ok(CallValue::Reservation {
                status: existing.status,
                reason: None,
            });
        }

        let available = self.available_balance(account_id)?;
        if available < amount {
            return Ok(CallValue::Reservation {
                status: ReservationStatus::Denied,
                reason: Some(format!(
                    "Insufficient available balance on account {}: {} < {}",
                    account_id, available, amount
                )),
            });
        }

        self.ledger
            .save_reservation(Reservation::new(account_id, transaction_id, amount))?;
        Ok(CallValue::Reservation {
            status: ReservationStatus::Ok,
            reason: None,
        })
    }

    /// Take a reservation in status `Ok` from the balance
    fn debit(&self, account_id: &str, transaction_id: TransactionId) -> Result<(), LedgerError> {
        let reservation = self.open_reservation(account_id, transaction_id)?;
        let account = self.ledger.get_account(account_id)?;

        let new_balance = account
            .balance
            .checked_sub(reservation.amount)
            .ok_or_else(|| LedgerError::arithmetic_underflow("debit", account_id))?;

        self.ledger.update_balance_and_reservation_status(
            account_id,
            transaction_id,
            new_balance,
            ReservationStatus::Debited,
        )
    }

    fn cancel(&self, account_id: &str, transaction_id: TransactionId) -> Result<(), LedgerError> {
        self.open_reservation(account_id, transaction_id)?;
        self.ledger
            .update_reservation_status(account_id, transaction_id, ReservationStatus::Canceled)
    }

    /// Credit an account; a credit already recorded for the transaction is a no-op
    fn add(
        &self,
        account_id: &str,
        transaction_id: Option<TransactionId>,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if let Some(transaction_id) = transaction_id {
            if self.ledger.find_credit(account_id, transaction_id)?.is_some() {
                debug!(
                    shard = self.shard,
                    account_id,
                    transaction_id = %transaction_id,
                    "Credit already applied"
                );
                return Ok(());
            }
        }

        let account = self.ledger.get_account(account_id)?;
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("add", account_id))?;

        match transaction_id {
            Some(transaction_id) => self.ledger.update_balance_with_credit(
                account_id,
                transaction_id,
                amount,
                new_balance,
            ),
            None => self.ledger.update_balance(account_id, new_balance),
        }
    }

    fn existing_reservation(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Reservation, LedgerError> {
        self.ledger
            .find_reservation(account_id, transaction_id)?
            .ok_or_else(|| LedgerError::reservation_not_found(account_id, transaction_id))
    }

    fn open_reservation(
        &self,
        account_id: &str,
        transaction_id: TransactionId,
    ) -> Result<Reservation, LedgerError> {
        let reservation = self.existing_reservation(account_id, transaction_id)?;
        if reservation.status != ReservationStatus::Ok {
            return Err(LedgerError::reservation_not_ok(
                account_id,
                transaction_id,
                reservation.status,
            ));
        }
        Ok(reservation)
    }
}

fn require<T: Copy>(call: &Call, value: Option<T>, field: &'static str) -> Result<T, LedgerError> {
    value.ok_or_else(|| LedgerError::missing_field(call.call_type, field))
}
