//! Webhook event repository.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use super::{Result, StorageError};
use crate::model::{WebhookEvent, WebhookStatus};

fn webhook_from_row(row: &PgRow) -> Result<WebhookEvent> {
    let status: String = row.get("status");

    Ok(WebhookEvent {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        url: row.get("url"),
        signature: row.get("signature"),
        attempts: row.get("attempts"),
        max_attempts: row.get("max_attempts"),
        next_retry_at: row.get("next_retry_at"),
        last_error: row.get("last_error"),
        status: status
            .parse::<WebhookStatus>()
            .map_err(StorageError::Corrupt)?,
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
    })
}

/// Persist a new pending event.
pub async fn insert(ex: impl PgExecutor<'_>, event: &WebhookEvent) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO webhook_events
           (id, payment_id, event_type, payload, url, signature, attempts,
            max_attempts, next_retry_at, last_error, status, created_at, sent_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
    )
    .bind(event.id)
    .bind(event.payment_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(&event.url)
    .bind(&event.signature)
    .bind(event.attempts)
    .bind(event.max_attempts)
    .bind(event.next_retry_at)
    .bind(&event.last_error)
    .bind(event.status.as_str())
    .bind(event.created_at)
    .bind(event.sent_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// Fetch one event.
pub async fn find(ex: impl PgExecutor<'_>, id: Uuid) -> Result<Option<WebhookEvent>> {
    let row = sqlx::query("SELECT * FROM webhook_events WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await?;

    row.as_ref().map(webhook_from_row).transpose()
}

/// Mark an event delivered, recording the attempt that succeeded.
pub async fn mark_sent(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    attempts: i32,
    sent_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE webhook_events
           SET status = 'sent', attempts = $2, sent_at = $3, last_error = NULL
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(attempts)
    .bind(sent_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// Record a failed attempt: bump the counter, schedule or finalize.
pub async fn record_failure(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    attempts: i32,
    status: WebhookStatus,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: &str,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE webhook_events
           SET attempts = $2, status = $3, next_retry_at = $4, last_error = $5
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(attempts)
    .bind(status.as_str())
    .bind(next_retry_at)
    .bind(last_error)
    .execute(ex)
    .await?;

    Ok(())
}

/// Pending events whose retry time has arrived (or was never set), bounded.
pub async fn due_for_retry(
    ex: impl PgExecutor<'_>,
    now: DateTime<Utc>,
    limit: u64,
) -> Result<Vec<WebhookEvent>> {
    let rows = sqlx::query(
        r#"SELECT * FROM webhook_events
           WHERE status = 'pending'
             AND (next_retry_at IS NULL OR next_retry_at <= $1)
             AND attempts < max_attempts
           ORDER BY created_at ASC
           LIMIT $2"#,
    )
    .bind(now)
    .bind(limit as i64)
    .fetch_all(ex)
    .await?;

    rows.iter().map(webhook_from_row).collect()
}
