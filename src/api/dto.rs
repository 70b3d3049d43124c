//! Request and response bodies.
//!
//! Amounts cross the wire as decimal strings with four fractional digits.
//! Currencies are uppercase three-letter codes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Payment, Refund, Transaction};
use crate::money::format_decimal;
use crate::services::{ChargeResult, RefundableSummary};

/// POST /payments body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub metadata: Option<Value>,
    pub webhook_url: Option<String>,
}

/// POST /payments/:id/refunds body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefundRequest {
    pub amount: Decimal,
    pub reason: Option<String>,
}

/// List pagination query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Pagination envelope.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

/// GET /payments response.
#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub data: Vec<PaymentBody>,
    pub pagination: Pagination,
}

/// A payment as rendered on the wire.
#[derive(Debug, Serialize)]
pub struct PaymentBody {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub provider: String,
    pub provider_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentBody {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            external_id: payment.external_id.clone(),
            amount: format_decimal(payment.amount),
            currency: payment.currency.as_str().to_string(),
            status: payment.status.as_str().to_string(),
            provider: payment.provider.clone(),
            provider_transaction_id: payment.provider_transaction_id.clone(),
            description: payment.description.clone(),
            metadata: payment.metadata.clone(),
            webhook_url: payment.webhook_url.clone(),
            error_code: None,
            error_message: None,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }

    pub fn from_charge(result: &ChargeResult) -> Self {
        let mut body = Self::from_payment(&result.payment);
        body.error_code = result.error_code.clone();
        body.error_message = result.error_message.clone();
        body
    }
}

/// GET /payments/:id response: the payment with its history embedded.
#[derive(Debug, Serialize)]
pub struct PaymentDetailBody {
    #[serde(flatten)]
    pub payment: PaymentBody,
    pub transactions: Vec<TransactionBody>,
    pub refunds: Vec<RefundBody>,
}

/// A transaction-log row on the wire.
#[derive(Debug, Serialize)]
pub struct TransactionBody {
    pub id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionBody {
    pub fn from_transaction(txn: &Transaction) -> Self {
        Self {
            id: txn.id,
            status: txn.status.as_str().to_string(),
            provider_response: txn.provider_response.clone(),
            error_message: txn.error_message.clone(),
            created_at: txn.created_at,
        }
    }
}

/// A refund on the wire.
#[derive(Debug, Serialize)]
pub struct RefundBody {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub provider_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefundBody {
    pub fn from_refund(refund: &Refund) -> Self {
        Self {
            id: refund.id,
            payment_id: refund.payment_id,
            amount: format_decimal(refund.amount),
            status: refund.status.as_str().to_string(),
            reason: refund.reason.clone(),
            provider_refund_id: refund.provider_refund_id.clone(),
            created_at: refund.created_at,
            updated_at: refund.updated_at,
        }
    }
}

/// POST /payments/:id/refunds response.
#[derive(Debug, Serialize)]
pub struct RefundResponseBody {
    #[serde(flatten)]
    pub refund: RefundBody,
    pub payment_status: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /payments/:id/refundable response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundableBody {
    pub payment_amount: String,
    pub total_refunded: String,
    pub pending_refunds: String,
    pub available_for_refund: String,
}

impl RefundableBody {
    pub fn from_summary(summary: &RefundableSummary) -> Self {
        Self {
            payment_amount: format_decimal(summary.payment_amount),
            total_refunded: format_decimal(summary.total_refunded),
            pending_refunds: format_decimal(summary.pending_refunds),
            available_for_refund: format_decimal(summary.available_for_refund),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::model::PaymentStatus;
    use crate::money::Currency;

    fn payment() -> Payment {
        Payment {
            id: Uuid::new_v4(),
            external_id: None,
            merchant_id: "m_1".into(),
            amount: "100.5".parse().unwrap(),
            currency: Currency::parse("USD").unwrap(),
            status: PaymentStatus::Completed,
            provider: "stripe".into(),
            provider_transaction_id: Some("ch_abc".into()),
            description: None,
            metadata: json!({}),
            webhook_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_amount_renders_four_digits() {
        let body = PaymentBody::from_payment(&payment());
        assert_eq!(body.amount, "100.5000");
        assert_eq!(body.currency, "USD");
    }

    #[test]
    fn test_merchant_id_never_serialized() {
        let body = serde_json::to_value(PaymentBody::from_payment(&payment())).unwrap();
        assert!(body.get("merchant_id").is_none());
    }

    #[test]
    fn test_refundable_field_names() {
        let body = serde_json::to_value(RefundableBody::from_summary(&RefundableSummary {
            payment_amount: "100".parse().unwrap(),
            total_refunded: "30".parse().unwrap(),
            pending_refunds: "0".parse().unwrap(),
            available_for_refund: "70".parse().unwrap(),
        }))
        .unwrap();

        assert_eq!(
            body.get("availableForRefund").and_then(|v| v.as_str()),
            Some("70.0000")
        );
        assert_eq!(
            body.get("paymentAmount").and_then(|v| v.as_str()),
            Some("100.0000")
        );
    }
}
