//! CSV format handling for command scripts and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - ScriptRecord structure for deserialization
//! - Conversion from script records to `ScriptCommand`
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::AccountId;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One script row
///
/// Matches the input CSV format with columns: command, account, to, amount.
/// `to` is only used by transfers and `amount` is absent for `open` and
/// `balance`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScriptRecord {
    pub command: String,
    pub account: String,
    pub to: Option<String>,
    pub amount: Option<String>,
}

/// A validated script command
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Open { account: AccountId },
    Put { account: AccountId, amount: Decimal },
    Withdraw { account: AccountId, amount: Decimal },
    Transfer { from: AccountId, to: AccountId, amount: Decimal },
    Balance { account: AccountId },
}

/// Convert a ScriptRecord to a ScriptCommand
///
/// Command names are case-insensitive. Amount range and scale are not checked
/// here; the service validates them.
///
/// # Returns
///
/// Result containing either:
/// - Ok(ScriptCommand) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_script_record(record: ScriptRecord) -> Result<ScriptCommand, String> {
    let account = record.account.trim().to_string();
    if account.is_empty() {
        return Err(format!("Command '{}' requires an account", record.command));
    }

    let amount = match record.amount.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Some(
            Decimal::from_str(text)
                .map_err(|_| format!("Invalid amount '{}' for account {}", text, account))?,
        ),
        _ => None,
    };
    let require_amount = || {
        amount.ok_or_else(|| format!("Command '{}' for account {} requires an amount", record.command, account))
    };

    let command = match record.command.trim().to_lowercase().as_str() {
        "open" => ScriptCommand::Open {
            account: account.clone(),
        },
        "balance" => ScriptCommand::Balance {
            account: account.clone(),
        },
        "put" => ScriptCommand::Put {
            amount: require_amount()?,
            account: account.clone(),
        },
        "withdraw" => ScriptCommand::Withdraw {
            amount: require_amount()?,
            account: account.clone(),
        },
        "transfer" => {
            let to = record
                .to
                .as_deref()
                .map(str::trim)
                .filter(|to| !to.is_empty())
                .ok_or_else(|| format!("Transfer from {} requires a destination", account))?;
            ScriptCommand::Transfer {
                amount: require_amount()?,
                from: account.clone(),
                to: to.to_string(),
            }
        }
        other => return Err(format!("Invalid command: '{}' for account {}", other, account)),
    };

    Ok(command)
}

/// Write account balances to CSV format
///
/// Writes balances with columns: account, balance, sorted by account id for
/// deterministic output.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_balances_csv(
    balances: &[(AccountId, Decimal)],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    for (account, balance) in sorted {
        writer
            .write_record(&[account, format!("{:.2}", balance)])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
