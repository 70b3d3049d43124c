//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables. Defaults
//! are safe for development; production startup fails fast when a required
//! secret is missing.

mod messaging;
mod resilience;
mod server;
mod storage;
mod webhooks;

pub use messaging::AmqpConfig;
pub use resilience::{BreakerConfig, IdempotencyConfig};
pub use server::{Environment, ServerConfig};
pub use storage::{PostgresConfig, RedisConfig};
pub use webhooks::WebhookConfig;

use serde::Deserialize;

/// Environment variable consulted for the tracing filter.
pub const LOG_ENV_VAR: &str = "PAYRAIL_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// PostgreSQL configuration.
    pub postgres: PostgresConfig,
    /// Redis cache configuration.
    pub redis: RedisConfig,
    /// AMQP queue configuration.
    pub amqp: AmqpConfig,
    /// Webhook delivery configuration.
    pub webhooks: WebhookConfig,
    /// Circuit breaker defaults.
    pub breaker: BreakerConfig,
    /// Idempotency engine configuration.
    pub idempotency: IdempotencyConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `PAYRAIL_CONFIG` environment variable (if set)
    /// 3. Environment variables with `PAYRAIL` prefix (`__` separator)
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment as EnvSource, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new("config.yaml", FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var("PAYRAIL_CONFIG") {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                EnvSource::with_prefix("PAYRAIL")
                    .separator("__")
                    .try_parsing(true)
                    // e.g. PAYRAIL__WEBHOOKS__RETRY_SCHEDULE_MS=60000,300000
                    .list_separator(",")
                    .with_list_parse_key("webhooks.retry_schedule_ms"),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on configuration a production deployment must not run with.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.environment == Environment::Production {
            if self.webhooks.secret.is_empty() {
                return Err("webhooks.secret is required in production".into());
            }
            if self.webhooks.allow_http {
                return Err("webhooks.allow_http must be false in production".into());
            }
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.webhooks.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_webhook_secret() {
        let mut config = Config::default();
        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.webhooks.secret = "whsec_test".to_string();
        config.webhooks.allow_http = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_rejects_plain_http_webhooks() {
        let mut config = Config::default();
        config.server.environment = Environment::Production;
        config.webhooks.secret = "whsec_test".to_string();
        config.webhooks.allow_http = true;
        assert!(config.validate().is_err());
    }
}
