//! Merchant webhook events: one delivery attempt stream per event.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delivery states of a webhook event.
///
/// `sent` implies `sent_at` is set; `failed` implies `attempts` reached
/// `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Pending,
    Sent,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Sent => "sent",
            WebhookStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WebhookStatus::Pending),
            "sent" => Ok(WebhookStatus::Sent),
            "failed" => Ok(WebhookStatus::Failed),
            other => Err(format!("unknown webhook status: {other}")),
        }
    }
}

/// A signed event awaiting (or past) delivery to a merchant endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub payment_id: Option<Uuid>,
    pub event_type: String,
    /// Canonical payload, including `event_type` and `timestamp` fields.
    pub payload: Value,
    pub url: String,
    /// Precomputed `t=...,v1=...` signature header value.
    pub signature: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status: WebhookStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Whether the persistence-driven retry schedule still owns this event.
    pub fn retryable(&self) -> bool {
        self.status == WebhookStatus::Pending && self.attempts < self.max_attempts
    }
}
