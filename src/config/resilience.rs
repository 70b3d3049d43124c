//! Circuit breaker and idempotency configuration.

use std::time::Duration;

use serde::Deserialize;

/// Per-provider circuit breaker defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Per-call timeout in seconds; a slower call counts as failure.
    pub call_timeout_secs: u64,
    /// Failure-rate threshold in percent that opens the breaker.
    pub error_threshold_pct: u8,
    /// Seconds an open breaker waits before a half-open probe.
    pub reset_timeout_secs: u64,
    /// Minimum observed requests before the rate is evaluated.
    pub volume_threshold: u32,
    /// Sliding window over which outcomes are tracked, in seconds.
    pub window_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 10,
            error_threshold_pct: 50,
            reset_timeout_secs: 30,
            volume_threshold: 5,
            window_secs: 60,
        }
    }
}

impl BreakerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Idempotency engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Record TTL in seconds (default 24 h).
    pub ttl_secs: u64,
    /// Interval between expired-row sweeps, in seconds.
    pub gc_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            gc_interval_secs: 300,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
