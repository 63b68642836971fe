//! Command script processing
//!
//! Replays a CSV command script against a freshly started engine and writes
//! the resulting balances:
//!
//! ```text
//! ScriptRunner
//!     ├── ScriptReader         (streaming CSV rows -> ScriptCommand)
//!     ├── TransferEngine       (started per script, shut down afterwards)
//!     │   └── MoneyTransferService
//!     └── write_balances_csv   (sorted account,balance output)
//! ```
//!
//! Rows run one after another; every money command waits for its transfer to
//! become final before the next row is read. A failing row is logged and
//! counted, and the script carries on.

use std::io::Write;
use std::path::Path;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::{MoneyTransferService, TransferEngine};
use crate::io::{write_balances_csv, ScriptCommand, ScriptReader};
use crate::types::{AccountId, TransferError};

/// Row counts of a processed script
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    pub applied: usize,
    pub failed: usize,
}

/// Runs command scripts with a given engine configuration
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: EngineConfig,
}

impl ScriptRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Replay the script at `input_path` and write final balances to `output`
    ///
    /// # Returns
    ///
    /// * `Ok(ScriptSummary)` once every row was attempted and output written
    /// * `Err(String)` if a fatal error occurred (file not found, engine
    ///   start failure, output cannot be written)
    pub async fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ScriptSummary, String> {
        let reader = ScriptReader::new(input_path)?;
        let engine = TransferEngine::start(self.config.clone())
            .await
            .map_err(|e| format!("Failed to start engine: {}", e))?;
        let service = engine.service();

        let mut summary = ScriptSummary::default();
        for row in reader {
            let result = match row {
                Ok(command) => apply(&service, command)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!(error = %e, "Script row failed");
                    summary.failed += 1;
                }
            }
        }

        let balances = balances(&service).await;
        engine.shutdown().await;
        write_balances_csv(&balances?, output)?;

        info!(
            applied = summary.applied,
            failed = summary.failed,
            "Script finished"
        );
        Ok(summary)
    }
}

async fn apply(service: &MoneyTransferService, command: ScriptCommand) -> Result<(), TransferError> {
    match command {
        ScriptCommand::Open { account } => service.open_account(&account),
        ScriptCommand::Put { account, amount } => service.put(&account, amount).await.map(drop),
        ScriptCommand::Withdraw { account, amount } => {
            service.withdraw(&account, amount).await.map(drop)
        }
        ScriptCommand::Transfer { from, to, amount } => {
            service.transfer(&from, &to, amount).await.map(drop)
        }
        ScriptCommand::Balance { account } => {
            let balance = service.get_balance(&account).await?;
            info!(account_id = %account, balance = %balance, "Balance");
            Ok(())
        }
    }
}

async fn balances(service: &MoneyTransferService) -> Result<Vec<(AccountId, Decimal)>, String> {
    let mut balances = Vec::new();
    for account in service.list_accounts() {
        let balance = service
            .get_balance(&account)
            .await
            .map_err(|e| format!("Failed to read balance: {}", e))?;
        balances.push((account, balance));
    }
    Ok(balances)
}
