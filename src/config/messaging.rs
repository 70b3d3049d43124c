//! Messaging configuration types.

use serde::Deserialize;

/// AMQP (RabbitMQ) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g. amqp://localhost:5672).
    pub url: String,
    /// Queue name for webhook delivery jobs.
    pub webhook_queue: String,
    /// Consumer tag prefix.
    pub consumer_tag: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            webhook_queue: "payrail.webhooks".to_string(),
            consumer_tag: "payrail-worker".to_string(),
        }
    }
}
