//! Outbound webhook transport.
//!
//! The POST itself sits behind a trait so delivery logic is testable
//! without a live endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport-level delivery failure (no HTTP status was obtained).
#[derive(Debug, thiserror::Error)]
#[error("Webhook transport error: {0}")]
pub struct TransportError(pub String);

/// Headers attached to every delivery.
#[derive(Debug, Clone)]
pub struct DeliveryHeaders {
    /// `X-Webhook-Signature` value, `t=...,v1=...`.
    pub signature: String,
    /// `X-Webhook-Id` value.
    pub webhook_id: String,
    /// `X-Event-Type` value.
    pub event_type: String,
}

/// POST a signed payload to a merchant endpoint; returns the HTTP status.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, body: &[u8], headers: &DeliveryHeaders) -> Result<u16>;
}

/// reqwest-backed transport with a fixed request deadline.
pub struct HttpWebhookTransport {
    client: reqwest::Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(format!("failed to build client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, url: &str, body: &[u8], headers: &DeliveryHeaders) -> Result<u16> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", &headers.signature)
            .header("X-Webhook-Id", &headers.webhook_id)
            .header("X-Event-Type", &headers.event_type)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(url = %url, status, "Webhook POSTed");
        Ok(status)
    }
}
