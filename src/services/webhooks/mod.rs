//! Durable webhook delivery.
//!
//! Enqueue validates the destination, signs the canonical payload, persists
//! a pending event, and publishes its id to the queue. Send POSTs with a
//! fixed deadline; failures flow into a persistence-driven retry schedule
//! with exponential spacing. Delivery failures never reach API callers.

pub mod transport;
pub mod url;

pub use transport::{DeliveryHeaders, HttpWebhookTransport, TransportError, WebhookTransport};
pub use url::{validate_webhook_url, UrlError};

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::crypto;
use crate::idempotency::canonical_json;
use crate::interfaces::{JobQueue, QueueError};
use crate::model::{WebhookEvent, WebhookStatus};
use crate::storage::{self, Database, StorageError};

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Errors raised by the delivery pipeline.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Destination URL rejected: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Queue message body: the id of a persisted webhook event.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookJob {
    pub webhook_id: Uuid,
}

/// What happened on a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx received; marked sent.
    Delivered,
    /// Row already `sent`; nothing to do.
    AlreadySent,
    /// Row already `failed`; permanently exhausted, never retried.
    Exhausted,
    /// No such row; the message is discarded.
    Missing,
    /// Delivery failed; a retry is scheduled in persistence.
    RetryScheduled,
    /// Delivery failed and this was the final attempt.
    PermanentlyFailed,
}

/// Stamp the payload with `event_type` and `timestamp`, then sign its
/// canonical serialization. Returns the enriched payload and the
/// `t=...,v1=...` header value.
pub fn sign_event_payload(
    event_type: &str,
    mut payload: Value,
    secret: &str,
    now: chrono::DateTime<Utc>,
) -> (Value, String) {
    if let Some(object) = payload.as_object_mut() {
        object.insert(
            "event_type".to_string(),
            Value::String(event_type.to_string()),
        );
        object.insert(
            "timestamp".to_string(),
            Value::String(now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }

    let body = canonical_json(&payload);
    let signature = crypto::sign_payload(body.as_bytes(), secret, now.timestamp());
    (payload, signature)
}

/// Signs, persists, sends, and reschedules merchant webhooks.
pub struct WebhookDeliveryService {
    db: Database,
    queue: Arc<dyn JobQueue>,
    transport: Arc<dyn WebhookTransport>,
    config: WebhookConfig,
}

impl WebhookDeliveryService {
    pub fn new(
        db: Database,
        queue: Arc<dyn JobQueue>,
        transport: Arc<dyn WebhookTransport>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            db,
            queue,
            transport,
            config,
        }
    }

    /// Validate a destination URL against the configured policy.
    pub fn validate_url(&self, url: &str) -> std::result::Result<(), UrlError> {
        validate_webhook_url(url, self.config.allow_http)
    }

    /// Validate, sign, persist, and publish a new event.
    pub async fn enqueue(
        &self,
        payment_id: Option<Uuid>,
        event_type: &str,
        payload: Value,
        url: &str,
    ) -> Result<WebhookEvent> {
        validate_webhook_url(url, self.config.allow_http)?;

        let now = Utc::now();
        let (payload, signature) = sign_event_payload(event_type, payload, &self.config.secret, now);

        let event = WebhookEvent {
            id: crypto::generate_entity_id(),
            payment_id,
            event_type: event_type.to_string(),
            payload,
            url: url.to_string(),
            signature,
            attempts: 0,
            max_attempts: self.config.max_attempts,
            next_retry_at: None,
            last_error: None,
            status: WebhookStatus::Pending,
            created_at: now,
            sent_at: None,
        };

        storage::webhooks::insert(self.db.pool(), &event).await?;
        self.publish_job(event.id, None).await?;

        debug!(webhook_id = %event.id, event_type, "Webhook enqueued");
        Ok(event)
    }

    /// Deliver one persisted event by id.
    pub async fn send(&self, webhook_id: Uuid) -> Result<SendOutcome> {
        let Some(event) = storage::webhooks::find(self.db.pool(), webhook_id).await? else {
            warn!(webhook_id = %webhook_id, "Webhook row missing, discarding job");
            return Ok(SendOutcome::Missing);
        };

        match event.status {
            WebhookStatus::Sent => return Ok(SendOutcome::AlreadySent),
            WebhookStatus::Failed => return Ok(SendOutcome::Exhausted),
            WebhookStatus::Pending => {
                if !event.retryable() {
                    return Ok(SendOutcome::Exhausted);
                }
            }
        }

        let body = canonical_json(&event.payload);
        let headers = DeliveryHeaders {
            signature: event.signature.clone(),
            webhook_id: event.id.to_string(),
            event_type: event.event_type.clone(),
        };

        match self.transport.post(&event.url, body.as_bytes(), &headers).await {
            Ok(status) if (200..300).contains(&status) => {
                storage::webhooks::mark_sent(self.db.pool(), event.id, event.attempts + 1, Utc::now())
                    .await?;
                info!(webhook_id = %event.id, attempts = event.attempts + 1, "Webhook delivered");
                Ok(SendOutcome::Delivered)
            }
            Ok(status) => {
                self.handle_failure(&event, &format!("HTTP {status}")).await
            }
            Err(e) => self.handle_failure(&event, &e.to_string()).await,
        }
    }

    /// Bump the attempt counter; schedule the next try or finalize.
    async fn handle_failure(&self, event: &WebhookEvent, error: &str) -> Result<SendOutcome> {
        let attempts = event.attempts + 1;

        if attempts >= event.max_attempts {
            storage::webhooks::record_failure(
                self.db.pool(),
                event.id,
                attempts,
                WebhookStatus::Failed,
                None,
                error,
            )
            .await?;
            warn!(
                webhook_id = %event.id,
                attempts,
                error,
                "Webhook permanently failed"
            );
            return Ok(SendOutcome::PermanentlyFailed);
        }

        let delay = self.config.retry_delay(attempts);
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

        storage::webhooks::record_failure(
            self.db.pool(),
            event.id,
            attempts,
            WebhookStatus::Pending,
            Some(next_retry_at),
            error,
        )
        .await?;

        self.publish_job(event.id, Some(delay)).await?;

        debug!(
            webhook_id = %event.id,
            attempts,
            delay_secs = delay.as_secs(),
            error,
            "Webhook retry scheduled"
        );
        Ok(SendOutcome::RetryScheduled)
    }

    /// Republish pending events whose retry time has arrived.
    ///
    /// The in-process delay timer is lossy across restarts; this sweep makes
    /// the persisted schedule authoritative.
    pub async fn sweep_due(&self) -> Result<usize> {
        let due = storage::webhooks::due_for_retry(
            self.db.pool(),
            Utc::now(),
            self.config.sweep_batch,
        )
        .await?;

        let count = due.len();
        for event in due {
            if let Err(e) = self.publish_job(event.id, None).await {
                warn!(webhook_id = %event.id, error = %e, "Sweep republish failed");
            }
        }

        if count > 0 {
            info!(count, "Republished due webhooks");
        }
        Ok(count)
    }

    async fn publish_job(&self, webhook_id: Uuid, delay: Option<std::time::Duration>) -> Result<()> {
        let job = WebhookJob { webhook_id };
        let payload = serde_json::to_vec(&job)
            .map_err(|e| QueueError::Publish(format!("job serialization: {e}")))?;

        match delay {
            Some(delay) if !delay.is_zero() => {
                self.queue.publish_delayed(payload, delay).await?
            }
            _ => self.queue.publish(payload).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
