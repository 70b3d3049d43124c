//! API key credentials.
//!
//! Only the SHA-256 hash of a key is stored, with an algorithm prefix.
//! The core consumes nothing but the merchant attribution resolved here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// `"sha256:" + hex(SHA256(key))`.
    pub key_hash: String,
    pub merchant_id: String,
    pub permissions: Vec<String>,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == "*" || p == permission)
    }
}
