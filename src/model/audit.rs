//! Append-only audit entries for post-hoc reconstruction of entity changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActorType {
    Merchant,
    System,
    Provider,
}

impl AuditActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditActorType::Merchant => "merchant",
            AuditActorType::System => "system",
            AuditActorType::Provider => "provider",
        }
    }
}

/// One recorded entity change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub actor: String,
    pub actor_type: AuditActorType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build a system-actor entry for an entity change.
    pub fn system(
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            old_values,
            new_values,
            actor: "payrail".to_string(),
            actor_type: AuditActorType::System,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    /// Build a merchant-attributed entry.
    pub fn merchant(
        merchant_id: &str,
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        new_values: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            old_values: None,
            new_values,
            actor: merchant_id.to_string(),
            actor_type: AuditActorType::Merchant,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }
}
