//! Money Transfer Engine CLI
//!
//! Replays a command script against the transfer engine and prints the final
//! balance of every account.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- script.csv > balances.csv
//! cargo run -- --shards 8 --processors 2 script.csv > balances.csv
//! RUST_LOG=debug cargo run -- script.csv > balances.csv
//! ```
//!
//! # Script Format
//!
//! ```text
//! command,account,to,amount
//! open,alice,,
//! put,alice,,100
//! transfer,alice,bob,25.50
//! withdraw,bob,,5
//! balance,alice,,
//! ```
//!
//! Rows that fail (validation, denial, unknown account) are logged to stderr
//! and skipped.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use money_transfer_engine::cli;
use money_transfer_engine::logging;
use money_transfer_engine::ScriptRunner;
use std::process;

fn main() {
    let args = cli::parse_args();

    if let Err(e) = logging::init_logging(&args.log_level) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let runner = ScriptRunner::new(args.to_engine_config());
    let mut output = std::io::stdout();
    if let Err(e) = runtime.block_on(runner.process(&args.script_file, &mut output)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
