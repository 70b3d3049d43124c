//! Refund repository.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use super::{Result, StorageError};
use crate::crypto;
use crate::model::{Refund, RefundStatus};

fn refund_from_row(row: &PgRow) -> Result<Refund> {
    let status: String = row.get("status");

    Ok(Refund {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        amount: row.get("amount"),
        status: status
            .parse::<RefundStatus>()
            .map_err(StorageError::Corrupt)?,
        reason: row.get("reason"),
        provider_refund_id: row.get("provider_refund_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Insert a new refund row.
pub async fn insert(ex: impl PgExecutor<'_>, refund: &Refund) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO refunds
           (id, payment_id, amount, status, reason, provider_refund_id, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(refund.id)
    .bind(refund.payment_id)
    .bind(refund.amount)
    .bind(refund.status.as_str())
    .bind(&refund.reason)
    .bind(&refund.provider_refund_id)
    .bind(refund.created_at)
    .bind(refund.updated_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// Move a refund to a terminal status, recording the provider refund id.
pub async fn update_status(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    status: RefundStatus,
    provider_refund_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE refunds
           SET status = $2,
               provider_refund_id = COALESCE($3, provider_refund_id),
               updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(provider_refund_id)
    .execute(ex)
    .await?;

    Ok(())
}

/// Fetch a refund by id, scoped to a merchant through its payment.
pub async fn find_for_merchant(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    merchant_id: &str,
) -> Result<Option<Refund>> {
    let row = sqlx::query(
        r#"SELECT r.* FROM refunds r
           JOIN payments p ON p.id = r.payment_id
           WHERE r.id = $1 AND p.merchant_id = $2"#,
    )
    .bind(id)
    .bind(merchant_id)
    .fetch_optional(ex)
    .await?;

    row.as_ref().map(refund_from_row).transpose()
}

/// All refunds for a payment, oldest first.
pub async fn list_for_payment(ex: impl PgExecutor<'_>, payment_id: Uuid) -> Result<Vec<Refund>> {
    let rows = sqlx::query("SELECT * FROM refunds WHERE payment_id = $1 ORDER BY created_at ASC")
        .bind(payment_id)
        .fetch_all(ex)
        .await?;

    rows.iter().map(refund_from_row).collect()
}

/// Completed and pending refund totals for a payment.
///
/// Read under the caller's payment row lock so the amount-conservation
/// check and the subsequent insert are atomic.
pub async fn totals_for_payment(
    ex: impl PgExecutor<'_>,
    payment_id: Uuid,
) -> Result<RefundTotals> {
    let row = sqlx::query(
        r#"SELECT
               COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS completed_total,
               COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS pending_total
           FROM refunds WHERE payment_id = $1"#,
    )
    .bind(payment_id)
    .fetch_one(ex)
    .await?;

    Ok(RefundTotals {
        completed: row.get("completed_total"),
        pending: row.get("pending_total"),
    })
}

/// Aggregated refund amounts for one payment.
#[derive(Debug, Clone, Copy)]
pub struct RefundTotals {
    pub completed: Decimal,
    pub pending: Decimal,
}

/// Build a pending refund row for the current moment.
pub fn new_refund(payment_id: Uuid, amount: Decimal, reason: Option<String>) -> Refund {
    let now = Utc::now();
    Refund {
        id: crypto::generate_entity_id(),
        payment_id,
        amount,
        status: RefundStatus::Pending,
        reason,
        provider_refund_id: None,
        created_at: now,
        updated_at: now,
    }
}
