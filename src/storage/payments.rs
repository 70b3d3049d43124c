//! Payment and transaction repositories.
//!
//! Row mapping is by hand: statuses and currencies are validated on read so
//! a corrupt row surfaces as [`StorageError::Corrupt`] instead of a panic.

use chrono::Utc;
use sea_query::{Asterisk, Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use super::schema::Payments;
use super::{Result, StorageError};
use crate::model::{Payment, PaymentStatus, Transaction};
use crate::money::Currency;

/// Map a payments row into the domain type.
pub(crate) fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let status: String = row.get("status");
    let currency: String = row.get("currency");

    Ok(Payment {
        id: row.get("id"),
        external_id: row.get("external_id"),
        merchant_id: row.get("merchant_id"),
        amount: row.get("amount"),
        currency: Currency::parse(currency.trim())
            .map_err(|e| StorageError::Corrupt(format!("payment currency: {e}")))?,
        status: status
            .parse::<PaymentStatus>()
            .map_err(StorageError::Corrupt)?,
        provider: row.get("provider"),
        provider_transaction_id: row.get("provider_transaction_id"),
        description: row.get("description"),
        metadata: row.get("metadata"),
        webhook_url: row.get("webhook_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let status: String = row.get("status");

    Ok(Transaction {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        status: status
            .parse::<PaymentStatus>()
            .map_err(StorageError::Corrupt)?,
        provider_response: row.get("provider_response"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

/// Insert a new payment row.
pub async fn insert(ex: impl PgExecutor<'_>, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO payments
           (id, external_id, merchant_id, amount, currency, status, provider,
            provider_transaction_id, description, metadata, webhook_url,
            created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
    )
    .bind(payment.id)
    .bind(&payment.external_id)
    .bind(&payment.merchant_id)
    .bind(payment.amount)
    .bind(payment.currency.as_str())
    .bind(payment.status.as_str())
    .bind(&payment.provider)
    .bind(&payment.provider_transaction_id)
    .bind(&payment.description)
    .bind(&payment.metadata)
    .bind(&payment.webhook_url)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// Update status and (optionally) the provider transaction id.
pub async fn update_status(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    status: PaymentStatus,
    provider_transaction_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE payments
           SET status = $2,
               provider_transaction_id = COALESCE($3, provider_transaction_id),
               updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(provider_transaction_id)
    .execute(ex)
    .await?;

    Ok(())
}

/// Fetch a payment by id, scoped to a merchant.
pub async fn find_for_merchant(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    merchant_id: &str,
) -> Result<Option<Payment>> {
    let row = sqlx::query("SELECT * FROM payments WHERE id = $1 AND merchant_id = $2")
        .bind(id)
        .bind(merchant_id)
        .fetch_optional(ex)
        .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// Fetch a payment by id with a row lock, scoped to a merchant.
pub async fn find_for_merchant_for_update(
    ex: impl PgExecutor<'_>,
    id: Uuid,
    merchant_id: &str,
) -> Result<Option<Payment>> {
    let row =
        sqlx::query("SELECT * FROM payments WHERE id = $1 AND merchant_id = $2 FOR UPDATE")
            .bind(id)
            .bind(merchant_id)
            .fetch_optional(ex)
            .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// Fetch a payment by id with a row lock, without merchant scoping.
///
/// For internal continuation of an operation whose merchant scope was
/// already established.
pub async fn find_by_id_for_update(ex: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Payment>> {
    let row = sqlx::query("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(ex)
        .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// Fetch a payment by provider transaction id with a row lock.
///
/// Used by provider-webhook reconciliation, which is not merchant-scoped.
pub async fn find_by_provider_transaction_for_update(
    ex: impl PgExecutor<'_>,
    provider_transaction_id: &str,
    provider: &str,
) -> Result<Option<Payment>> {
    let row = sqlx::query(
        "SELECT * FROM payments WHERE provider_transaction_id = $1 AND provider = $2 FOR UPDATE",
    )
    .bind(provider_transaction_id)
    .bind(provider)
    .fetch_optional(ex)
    .await?;

    row.as_ref().map(payment_from_row).transpose()
}

/// A page of payments for a merchant, newest first, plus the total count.
pub async fn list_for_merchant<'e, E>(
    ex: E,
    merchant_id: &str,
    limit: u64,
    offset: u64,
) -> Result<(Vec<Payment>, u64)>
where
    E: PgExecutor<'e> + Copy,
{
    let query = Query::select()
        .column(Asterisk)
        .from(Payments::Table)
        .and_where(Expr::col(Payments::MerchantId).eq(merchant_id))
        .order_by(Payments::CreatedAt, Order::Desc)
        .limit(limit)
        .offset(offset)
        .to_string(PostgresQueryBuilder);

    let rows = sqlx::query(&query).fetch_all(ex).await?;
    let payments = rows
        .iter()
        .map(payment_from_row)
        .collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE merchant_id = $1")
        .bind(merchant_id)
        .fetch_one(ex)
        .await?;

    Ok((payments, total as u64))
}

/// Append a transaction row (one per status transition or provider call).
pub async fn insert_transaction(ex: impl PgExecutor<'_>, txn: &Transaction) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO transactions
           (id, payment_id, status, provider_response, error_message, created_at)
           VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(txn.id)
    .bind(txn.payment_id)
    .bind(txn.status.as_str())
    .bind(&txn.provider_response)
    .bind(&txn.error_message)
    .bind(txn.created_at)
    .execute(ex)
    .await?;

    Ok(())
}

/// All transaction rows for a payment, oldest first.
pub async fn transactions_for_payment(
    ex: impl PgExecutor<'_>,
    payment_id: Uuid,
) -> Result<Vec<Transaction>> {
    let rows = sqlx::query(
        "SELECT * FROM transactions WHERE payment_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(payment_id)
    .fetch_all(ex)
    .await?;

    rows.iter().map(transaction_from_row).collect()
}

/// Build a transaction row for the current moment.
pub fn new_transaction(
    payment_id: Uuid,
    status: PaymentStatus,
    provider_response: Option<serde_json::Value>,
    error_message: Option<String>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        payment_id,
        status,
        provider_response,
        error_message,
        created_at: Utc::now(),
    }
}

/// Whether the unique-violation error names the merchant/external-id pair.
pub fn is_external_id_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some("payments_merchant_external_unique")
    )
}

/// Convenience holder for list pagination parameters.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}
