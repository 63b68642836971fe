use crate::config::EngineConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay a money transfer command script and print final balances
#[derive(Parser, Debug)]
#[command(name = "money-transfer-engine")]
#[command(about = "Replay a money transfer command script and print final balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV script with columns command,account,to,amount
    #[arg(value_name = "SCRIPT", help = "Path to the command script CSV file")]
    pub script_file: PathBuf,

    /// Number of account shards
    #[arg(
        long = "shards",
        value_name = "COUNT",
        help = "Number of account shards, one balance manager each (default: CPU cores)"
    )]
    pub shards: Option<usize>,

    /// Number of transaction processors
    #[arg(
        long = "processors",
        value_name = "COUNT",
        help = "Number of transaction processor workers (default: 1)"
    )]
    pub processors: Option<usize>,

    #[arg(
        long = "call-timeout-ms",
        value_name = "MILLIS",
        help = "Maximum wait for a balance call result (default: 30000)"
    )]
    pub call_timeout_ms: Option<u64>,

    #[arg(
        long = "transfer-timeout-ms",
        value_name = "MILLIS",
        help = "Maximum wait for a transfer to become final (default: 60000)"
    )]
    pub transfer_timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl CliArgs {
    /// Create an EngineConfig from CLI arguments
    ///
    /// Missing values use the defaults; zero values fall back to the defaults
    /// with a warning.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();
        let mut config = EngineConfig::new(
            self.shards.unwrap_or(default.shard_count),
            self.processors.unwrap_or(default.processor_count),
        );

        if let Some(millis) = self.call_timeout_ms {
            config = config.with_call_timeout(Duration::from_millis(millis));
        }
        if let Some(millis) = self.transfer_timeout_ms {
            config = config.with_transfer_timeout(Duration::from_millis(millis));
        }
        config
    }
}
