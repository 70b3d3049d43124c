//! API key repository.

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use super::Result;
use crate::model::ApiKey;

fn api_key_from_row(row: &PgRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        key_hash: row.get("key_hash"),
        merchant_id: row.get("merchant_id"),
        permissions: row.get("permissions"),
        active: row.get("active"),
        last_used_at: row.get("last_used_at"),
        created_at: row.get("created_at"),
    }
}

/// Look up a credential by its stored hash.
pub async fn find_by_hash(ex: impl PgExecutor<'_>, key_hash: &str) -> Result<Option<ApiKey>> {
    let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = $1")
        .bind(key_hash)
        .fetch_optional(ex)
        .await?;

    Ok(row.as_ref().map(api_key_from_row))
}

/// Best-effort bump of the last-used timestamp.
pub async fn touch_last_used(ex: impl PgExecutor<'_>, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
        .bind(id)
        .bind(Utc::now())
        .execute(ex)
        .await?;

    Ok(())
}

/// Insert a credential (provisioning and tests).
pub async fn insert(ex: impl PgExecutor<'_>, key: &ApiKey) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO api_keys
           (id, key_hash, merchant_id, permissions, active, last_used_at, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(key.id)
    .bind(&key.key_hash)
    .bind(&key.merchant_id)
    .bind(&key.permissions)
    .bind(key.active)
    .bind(key.last_used_at)
    .bind(key.created_at)
    .execute(ex)
    .await?;

    Ok(())
}
