//! Database schema identifiers using sea-query.
//!
//! These define table and column identifiers for type-safe query building.
//! Schema creation is handled via sqlx migrations (see `migrations/`).

use sea_query::Iden;

/// Payments table schema.
#[derive(Iden)]
pub enum Payments {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "external_id"]
    ExternalId,
    #[iden = "merchant_id"]
    MerchantId,
    #[iden = "amount"]
    Amount,
    #[iden = "currency"]
    Currency,
    #[iden = "status"]
    Status,
    #[iden = "provider"]
    Provider,
    #[iden = "provider_transaction_id"]
    ProviderTransactionId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Idempotency keys table schema.
#[derive(Iden)]
pub enum IdempotencyKeys {
    Table,
    #[iden = "key"]
    Key,
    #[iden = "merchant_id"]
    MerchantId,
    #[iden = "expires_at"]
    ExpiresAt,
}
