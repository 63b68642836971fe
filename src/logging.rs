//! Logging setup for the binary
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary. Logs go to stderr so stdout stays reserved for CSV output.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialise logging: {}", e))
}
