//! Exponential-backoff parameters for push-feed reconnection.
//!
//! The connection task in [`crate::manager`] owns the retry loop; this
//! module only computes delays so the policy stays trivially testable.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub retry_interval: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Automatic reconnect attempts before the connection enters `Error`.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `retry_interval * 2^(attempt-1)`, clamped to [`ReconnectConfig::max_delay`].
pub fn retry_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    config
        .retry_interval
        .saturating_mul(1u32 << shift)
        .min(config.max_delay)
}
