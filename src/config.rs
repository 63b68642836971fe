//! Engine configuration
//!
//! All tunables are passed explicitly into the components that need them;
//! there is no process-wide registry.

use rust_decimal::Decimal;
use std::time::Duration;
use tracing::warn;

/// Configuration for the transfer engine
///
/// Controls sharding, worker counts, every blocking wait and façade-side
/// amount validation.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of account shards, one Account Balance Manager each
    pub shard_count: usize,
    /// Number of Transaction Processor workers sharing the work queue
    pub processor_count: usize,
    /// Maximum time a caller waits for a call result
    pub call_timeout: Duration,
    /// One slice of a status wait; waits are repeated up to `transfer_timeout`
    pub status_wait_timeout: Duration,
    /// Maximum time the façade waits for a transfer to become final
    pub transfer_timeout: Duration,
    /// Queue poll interval of worker loops, bounds shutdown latency
    pub poll_interval: Duration,
    /// Grace period for a worker to finish its in-flight unit on shutdown
    pub shutdown_grace: Duration,
    /// Largest amount accepted for a single transaction
    pub max_transaction_amount: Decimal,
    /// Largest number of fractional digits accepted in an amount
    pub max_amount_scale: u32,
    /// Opening balance of the cash desk money enters the system through
    pub cash_desk_in_balance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shard_count: num_cpus::get(),
            processor_count: 1,
            call_timeout: Duration::from_secs(30),
            status_wait_timeout: Duration::from_secs(1),
            transfer_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(1),
            max_transaction_amount: Decimal::new(1_000_000_000_00, 2),
            max_amount_scale: 2,
            cash_desk_in_balance: Decimal::MAX,
        }
    }
}

impl EngineConfig {
    /// Create a config with custom worker counts
    ///
    /// Zero counts fall back to the defaults with a warning.
    pub fn new(shard_count: usize, processor_count: usize) -> Self {
        let default = Self::default();

        let shard_count = if shard_count == 0 {
            warn!(
                "Invalid shard_count ({}), using default ({})",
                shard_count, default.shard_count
            );
            default.shard_count
        } else {
            shard_count
        };

        let processor_count = if processor_count == 0 {
            warn!(
                "Invalid processor_count ({}), using default ({})",
                processor_count, default.processor_count
            );
            default.processor_count
        } else {
            processor_count
        };

        Self {
            shard_count,
            processor_count,
            ..default
        }
    }

    /// Override the call result timeout; zero keeps the current value
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            warn!("Invalid call_timeout (0), keeping {:?}", self.call_timeout);
        } else {
            self.call_timeout = timeout;
        }
        self
    }

    /// Override the overall transfer timeout; zero keeps the current value
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            warn!(
                "Invalid transfer_timeout (0), keeping {:?}",
                self.transfer_timeout
            );
        } else {
            self.transfer_timeout = timeout;
        }
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Override the per-worker shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Replace values the engine cannot run with by their defaults
    ///
    /// Fields are public, so a config may skip the checks in `new` and the
    /// builders; the engine applies this before wiring anything.
    pub fn validated(self) -> Self {
        let default = Self::default();
        let counts = Self::new(self.shard_count, self.processor_count);

        Self {
            shard_count: counts.shard_count,
            processor_count: counts.processor_count,
            call_timeout: non_zero("call_timeout", self.call_timeout, default.call_timeout),
            status_wait_timeout: non_zero(
                "status_wait_timeout",
                self.status_wait_timeout,
                default.status_wait_timeout,
            ),
            transfer_timeout: non_zero(
                "transfer_timeout",
                self.transfer_timeout,
                default.transfer_timeout,
            ),
            poll_interval: non_zero("poll_interval", self.poll_interval, default.poll_interval),
            ..self
        }
    }
}

fn non_zero(name: &str, value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        warn!("Invalid {} (0), using default ({:?})", name, fallback);
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.shard_count, num_cpus::get());
        assert_eq!(config.processor_count, 1);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.max_amount_scale, 2);
        assert_eq!(config.max_transaction_amount, Decimal::new(1_000_000_000, 0));
    }

    #[rstest]
    #[case::custom(4, 2, 4, 2)]
    #[case::zero_shards(0, 2, num_cpus::get(), 2)]
    #[case::zero_processors(4, 0, 4, 1)]
    fn test_new_falls_back_on_zero(
        #[case] shards: usize,
        #[case] processors: usize,
        #[case] expected_shards: usize,
        #[case] expected_processors: usize,
    ) {
        let config = EngineConfig::new(shards, processors);
        assert_eq!(config.shard_count, expected_shards);
        assert_eq!(config.processor_count, expected_processors);
    }

    #[test]
    fn test_validated_repairs_fields_set_directly() {
        let mut config = EngineConfig::new(4, 2).with_shutdown_grace(Duration::from_secs(3));
        config.shard_count = 0;
        config.processor_count = 0;
        config.poll_interval = Duration::ZERO;
        config.max_amount_scale = 4;

        let config = config.validated();

        assert_eq!(config.shard_count, num_cpus::get());
        assert_eq!(config.processor_count, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.max_amount_scale, 4);
    }

    #[test]
    fn test_zero_timeouts_are_ignored() {
        let config = EngineConfig::default()
            .with_call_timeout(Duration::ZERO)
            .with_transfer_timeout(Duration::from_secs(5));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.transfer_timeout, Duration::from_secs(5));
    }
}
