//! Payment provider interface.
//!
//! A provider is an opaque remote processor with four operations: charge,
//! refund, webhook parsing, and webhook signature verification. Provider
//! failures are returned in the response (`success: false`), never thrown,
//! so expected declines do not trip saga compensation.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::money::Currency;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors raised by provider plumbing (not by declined payments).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider rejected webhook: {0}")]
    InvalidWebhook(String),

    #[error("Webhook signature rejected")]
    InvalidSignature,

    #[error("Provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Stable machine code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            ProviderError::InvalidWebhook(_) => "INVALID_WEBHOOK",
            ProviderError::InvalidSignature => "INVALID_SIGNATURE",
            ProviderError::Transport(_) => "PROVIDER_TRANSPORT",
        }
    }
}

/// Provider-side payment status, normalized from provider-specific strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ProviderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderPaymentStatus::Pending => "pending",
            ProviderPaymentStatus::Completed => "completed",
            ProviderPaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A charge to execute.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Outcome of a charge. `success: false` is a normal terminal outcome.
#[derive(Debug, Clone)]
pub struct ChargeResponse {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub status: ProviderPaymentStatus,
    pub raw_response: Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// A refund to execute against a prior charge.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub refund_id: Uuid,
    pub provider_transaction_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: Option<String>,
}

/// Outcome of a refund.
#[derive(Debug, Clone)]
pub struct RefundResponse {
    pub success: bool,
    pub refund_id: Option<String>,
    pub status: ProviderPaymentStatus,
    pub raw_response: Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// A provider-originated webhook, normalized for reconciliation.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub event_type: String,
    pub transaction_id: String,
    pub status: ProviderPaymentStatus,
    pub raw_payload: Value,
}

/// Interface to an external payment processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registry name (lowercase).
    fn name(&self) -> &str;

    /// HTTP header carrying this provider's webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Execute a charge.
    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeResponse>;

    /// Execute a refund.
    async fn process_refund(&self, request: RefundRequest) -> Result<RefundResponse>;

    /// Parse a provider webhook payload into a normalized event.
    fn parse_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent>;

    /// Verify a provider webhook signature header.
    fn verify_webhook_signature(&self, payload: &[u8], header: &str, secret: &str) -> bool;
}

impl fmt::Debug for dyn PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProvider")
            .field("name", &self.name())
            .finish()
    }
}
