//! Append-only audit log repository.

use sqlx::PgExecutor;

use super::Result;
use crate::model::AuditEntry;

/// Append one audit entry.
///
/// Called inside the same transaction as the mutation it records wherever
/// one exists, so the audit trail cannot drift from committed state.
pub async fn insert(ex: impl PgExecutor<'_>, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, entity_type, entity_id, action, old_values, new_values,
            actor, actor_type, ip_address, user_agent, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .bind(&entry.actor)
    .bind(entry.actor_type.as_str())
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(entry.created_at)
    .execute(ex)
    .await?;

    Ok(())
}
