//! Webhook delivery configuration.

use std::time::Duration;

use serde::Deserialize;

/// Merchant webhook delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// HMAC secret for outbound signatures. Required in production.
    pub secret: String,
    /// Maximum delivery attempts per event.
    pub max_attempts: i32,
    /// Retry delay schedule in milliseconds, clamped to the last entry.
    pub retry_schedule_ms: Vec<u64>,
    /// Outbound request deadline in seconds.
    pub request_timeout_secs: u64,
    /// Accept plain-http destination URLs (development only).
    pub allow_http: bool,
    /// Sweep interval for pending retries, in seconds.
    pub sweep_interval_secs: u64,
    /// Maximum rows republished per sweep.
    pub sweep_batch: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: "whsec_dev".to_string(),
            max_attempts: 5,
            retry_schedule_ms: vec![60_000, 300_000, 900_000, 3_600_000],
            request_timeout_secs: 30,
            allow_http: true,
            sweep_interval_secs: 60,
            sweep_batch: 100,
        }
    }
}

impl WebhookConfig {
    /// Delay before retry number `attempt` (1-based), clamped to the last
    /// schedule entry on overflow.
    pub fn retry_delay(&self, attempt: i32) -> Duration {
        let idx = attempt.max(1) as usize - 1;
        let ms = self
            .retry_schedule_ms
            .get(idx)
            .or_else(|| self.retry_schedule_ms.last())
            .copied()
            .unwrap_or(60_000);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_follows_schedule() {
        let config = WebhookConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(60));
        assert_eq!(config.retry_delay(2), Duration::from_secs(300));
        assert_eq!(config.retry_delay(3), Duration::from_secs(900));
        assert_eq!(config.retry_delay(4), Duration::from_secs(3600));
    }

    #[test]
    fn test_retry_delay_clamps_to_last() {
        let config = WebhookConfig::default();
        assert_eq!(config.retry_delay(5), Duration::from_secs(3600));
        assert_eq!(config.retry_delay(50), Duration::from_secs(3600));
    }

    #[test]
    fn test_retry_delay_empty_schedule_falls_back() {
        let config = WebhookConfig {
            retry_schedule_ms: vec![],
            ..Default::default()
        };
        assert_eq!(config.retry_delay(1), Duration::from_secs(60));
    }
}
