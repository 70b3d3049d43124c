//! Idempotency record repository.

use chrono::Utc;
use sea_query::{Expr, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};

use super::schema::IdempotencyKeys;
use super::{Result, StorageError};
use crate::model::{IdempotencyRecord, IdempotencyStatus};

fn record_from_row(row: &PgRow) -> Result<IdempotencyRecord> {
    let status: String = row.get("status");

    Ok(IdempotencyRecord {
        key: row.get("key"),
        merchant_id: row.get("merchant_id"),
        fingerprint: row.get("fingerprint"),
        request_path: row.get("request_path"),
        request_method: row.get("request_method"),
        status: status
            .parse::<IdempotencyStatus>()
            .map_err(StorageError::Corrupt)?,
        response_body: row.get("response_body"),
        response_status: row.get("response_status"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

/// Fetch the record for a (key, merchant) pair.
pub async fn find(
    ex: impl PgExecutor<'_>,
    key: &str,
    merchant_id: &str,
) -> Result<Option<IdempotencyRecord>> {
    let row = sqlx::query("SELECT * FROM idempotency_keys WHERE key = $1 AND merchant_id = $2")
        .bind(key)
        .bind(merchant_id)
        .fetch_optional(ex)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Insert a fresh processing record.
pub async fn insert(ex: impl PgExecutor<'_>, record: &IdempotencyRecord) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO idempotency_keys
           (key, merchant_id, fingerprint, request_path, request_method, status,
            response_body, response_status, created_at, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(&record.key)
    .bind(&record.merchant_id)
    .bind(&record.fingerprint)
    .bind(&record.request_path)
    .bind(&record.request_method)
    .bind(record.status.as_str())
    .bind(&record.response_body)
    .bind(record.response_status)
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// Record the final response for a completed request.
pub async fn complete(
    ex: impl PgExecutor<'_>,
    key: &str,
    merchant_id: &str,
    response_body: &str,
    response_status: i32,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE idempotency_keys
           SET status = 'completed', response_body = $3, response_status = $4
           WHERE key = $1 AND merchant_id = $2"#,
    )
    .bind(key)
    .bind(merchant_id)
    .bind(response_body)
    .bind(response_status)
    .execute(ex)
    .await?;

    Ok(())
}

/// Delete a record so the caller may retry cleanly.
pub async fn delete(ex: impl PgExecutor<'_>, key: &str, merchant_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM idempotency_keys WHERE key = $1 AND merchant_id = $2")
        .bind(key)
        .bind(merchant_id)
        .execute(ex)
        .await?;

    Ok(())
}

/// Remove rows whose TTL has lapsed; returns how many were deleted.
pub async fn delete_expired(ex: impl PgExecutor<'_>) -> Result<u64> {
    let query = Query::delete()
        .from_table(IdempotencyKeys::Table)
        .and_where(Expr::col(IdempotencyKeys::ExpiresAt).lte(Utc::now()))
        .to_string(PostgresQueryBuilder);

    let result = sqlx::query(&query).execute(ex).await?;
    Ok(result.rows_affected())
}
