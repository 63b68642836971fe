//! Money transfer façade
//!
//! `MoneyTransferService` is the only entry point callers use. It validates
//! input, registers transfers with the Transaction Store and waits for them
//! to become final. It never changes a transaction status itself.
//!
//! Deposits and withdrawals are ordinary transfers against two technical
//! accounts: money enters through [`CASH_DESK_IN`], which starts with an
//! effectively unlimited balance, and leaves through [`CASH_DESK_OUT`].

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, info};

use super::call_bridge::CallBridge;
use super::traits::{LedgerStore, TransactionStore};
use crate::config::EngineConfig;
use crate::types::{
    Account, AccountId, Call, StatusRecord, Transaction, TransactionId, TransactionStatus,
    TransferError,
};

/// Account money is deposited from
pub const CASH_DESK_IN: &str = "cash-desk-in";

/// Account withdrawn money is sent to
pub const CASH_DESK_OUT: &str = "cash-desk-out";

fn is_cash_desk(account_id: &str) -> bool {
    account_id == CASH_DESK_IN || account_id == CASH_DESK_OUT
}

/// Limits applied to user-facing input
#[derive(Debug, Clone)]
struct Limits {
    max_amount: Decimal,
    max_scale: u32,
    transfer_timeout: Duration,
    status_wait_timeout: Duration,
}

/// Façade over accounts and transfers
///
/// Cloning is cheap; clones share the same stores and queues.
#[derive(Clone)]
pub struct MoneyTransferService {
    ledger: Arc<dyn LedgerStore>,
    store: Arc<dyn TransactionStore>,
    bridge: CallBridge,
    limits: Limits,
}

impl MoneyTransferService {
    pub fn new(
        config: &EngineConfig,
        ledger: Arc<dyn LedgerStore>,
        store: Arc<dyn TransactionStore>,
        bridge: CallBridge,
    ) -> Self {
        MoneyTransferService {
            ledger,
            store,
            bridge,
            limits: Limits {
                max_amount: config.max_transaction_amount,
                max_scale: config.max_amount_scale,
                transfer_timeout: config.transfer_timeout,
                status_wait_timeout: config.status_wait_timeout,
            },
        }
    }

    /// Ids of all customer accounts, sorted; cash desks are not listed
    pub fn list_accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self
            .ledger
            .account_ids()
            .into_iter()
            .filter(|id| !is_cash_desk(id))
            .collect();
        ids.sort();
        ids
    }

    /// Create an account with a generated id and zero balance
    pub fn create_account(&self) -> Result<AccountId, TransferError> {
        let account_id = uuid::Uuid::new_v4().to_string();
        self.ledger.create_account(Account::new(account_id.as_str()))?;
        info!(account_id = %account_id, "Account created");
        Ok(account_id)
    }

    /// Create an account with a caller-chosen id and zero balance
    pub fn open_account(&self, account_id: &str) -> Result<(), TransferError> {
        validate_account_id(account_id)?;
        self.ledger.create_account(Account::new(account_id))?;
        info!(account_id, "Account opened");
        Ok(())
    }

    /// Available balance: balance minus amounts reserved by pending transfers
    pub async fn get_balance(&self, account_id: &str) -> Result<Decimal, TransferError> {
        if account_id.is_empty() {
            return Err(TransferError::validation("Account id must not be empty"));
        }

        self.bridge
            .submit(Call::get_available_balance(account_id))
            .await
            .into_amount()
            .map_err(|e| TransferError::account(account_id, e))
    }

    /// Deposit `amount` into an account and wait for the outcome
    pub async fn put(&self, account_id: &str, amount: Decimal) -> Result<TransactionId, TransferError> {
        validate_account_id(account_id)?;
        self.transfer_and_wait(CASH_DESK_IN, account_id, amount).await
    }

    /// Withdraw `amount` from an account and wait for the outcome
    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        validate_account_id(account_id)?;
        self.transfer_and_wait(account_id, CASH_DESK_OUT, amount).await
    }

    /// Transfer between two customer accounts and wait for the outcome
    ///
    /// # Errors
    ///
    /// * `Validation` - bad input, nothing was registered
    /// * `Denied` - the transfer was rejected, e.g. insufficient funds
    /// * `Failed` - the transfer ended in `ERROR` and needs investigation
    /// * `Timeout` - not final in time; query the status again later
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        validate_account_id(from)?;
        validate_account_id(to)?;
        self.transfer_and_wait(from, to, amount).await
    }

    /// Register a transfer without waiting for it
    pub async fn transfer_async(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        validate_account_id(from)?;
        validate_account_id(to)?;
        self.register(from, to, amount).await
    }

    /// Last persisted status of a transaction
    pub async fn transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> Result<StatusRecord, TransferError> {
        let (_, status) = self.store.get(transaction_id).await?;
        Ok(status)
    }

    /// Wait until a transaction is final and map its outcome
    pub async fn wait_for_completion(&self, transaction_id: TransactionId) -> Result<(), TransferError> {
        let deadline = Instant::now() + self.limits.transfer_timeout;
        let (_, mut status) = self.store.get(transaction_id).await?;

        while !status.is_final() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransferError::Timeout {
                    transaction_id,
                    last_status: status.status,
                });
            }

            status = self
                .store
                .wait_for_status(
                    transaction_id,
                    status.status,
                    remaining.min(self.limits.status_wait_timeout),
                )
                .await?;
        }

        outcome(transaction_id, status)
    }

    async fn transfer_and_wait(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        let transaction_id = self.register(from, to, amount).await?;
        self.wait_for_completion(transaction_id).await?;
        Ok(transaction_id)
    }

    async fn register(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransactionId, TransferError> {
        if from == to {
            return Err(TransferError::validation(
                "Source and destination accounts must differ",
            ));
        }
        self.validate_amount(amount)?;

        let transaction = Transaction::new(from, to, amount);
        let transaction_id = transaction.id;
        self.store.save_new(transaction).await?;
        debug!(transaction_id = %transaction_id, from, to, amount = %amount, "Transfer registered");
        Ok(transaction_id)
    }

    fn validate_amount(&self, amount: Decimal) -> Result<(), TransferError> {
        if amount <= Decimal::ZERO {
            return Err(TransferError::validation(format!(
                "Amount must be positive, got {}",
                amount
            )));
        }
        if amount > self.limits.max_amount {
            return Err(TransferError::validation(format!(
                "Amount {} exceeds the maximum of {}",
                amount, self.limits.max_amount
            )));
        }
        if amount.normalize().scale() > self.limits.max_scale {
            return Err(TransferError::validation(format!(
                "Amount {} has more than {} decimal places",
                amount, self.limits.max_scale
            )));
        }
        Ok(())
    }
}

fn validate_account_id(account_id: &str) -> Result<(), TransferError> {
    if account_id.trim().is_empty() {
        return Err(TransferError::validation("Account id must not be empty"));
    }
    if is_cash_desk(account_id) {
        return Err(TransferError::validation(format!(
            "Account id {} is reserved",
            account_id
        )));
    }
    Ok(())
}

fn outcome(transaction_id: TransactionId, status: StatusRecord) -> Result<(), TransferError> {
    match status.status {
        TransactionStatus::Done => Ok(()),
        TransactionStatus::Denied => Err(TransferError::Denied {
            transaction_id,
            reason: status.reason,
        }),
        other => Err(TransferError::Failed {
            transaction_id,
            status: other,
            reason: status.reason,
        }),
    }
}
