//! Stripe-style provider.
//!
//! Transaction ids are `ch_<hex>`, refund ids `re_<hex>`. Webhook signatures
//! use the `t=<ts>,v1=<hex>` header format with a 300 second tolerance.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use crate::crypto;
use crate::interfaces::provider::{
    ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, ProviderEvent,
    ProviderPaymentStatus, RefundRequest, RefundResponse, Result,
};

/// Fractional cents that trigger a simulated decline.
pub(crate) fn declines_amount(amount: Decimal) -> bool {
    amount.fract() == Decimal::new(99, 2)
}

/// Fractional cents that leave the charge pending.
pub(crate) fn pending_amount(amount: Decimal) -> bool {
    amount.fract() == Decimal::new(50, 2)
}

/// Simulated Stripe processor.
pub struct StripeProvider {
    webhook_secret: String,
}

impl StripeProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    fn normalize_status(status: &str) -> Result<ProviderPaymentStatus> {
        match status {
            "succeeded" => Ok(ProviderPaymentStatus::Completed),
            "processing" | "pending" => Ok(ProviderPaymentStatus::Pending),
            "failed" | "canceled" => Ok(ProviderPaymentStatus::Failed),
            other => Err(ProviderError::InvalidWebhook(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &str {
        "stripe"
    }

    fn signature_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeResponse> {
        let transaction_id = format!("ch_{}", crypto::generate_short_id());

        if declines_amount(request.amount) {
            return Ok(ChargeResponse {
                success: false,
                transaction_id: Some(transaction_id.clone()),
                status: ProviderPaymentStatus::Failed,
                raw_response: json!({
                    "id": transaction_id,
                    "object": "charge",
                    "status": "failed",
                    "failure_code": "card_declined",
                }),
                error_code: Some("card_declined".to_string()),
                error_message: Some("Your card was declined.".to_string()),
            });
        }

        let status = if pending_amount(request.amount) {
            ProviderPaymentStatus::Pending
        } else {
            ProviderPaymentStatus::Completed
        };

        Ok(ChargeResponse {
            success: true,
            transaction_id: Some(transaction_id.clone()),
            status,
            raw_response: json!({
                "id": transaction_id,
                "object": "charge",
                "amount": request.amount.to_string(),
                "currency": request.currency.as_str().to_ascii_lowercase(),
                "status": match status {
                    ProviderPaymentStatus::Completed => "succeeded",
                    _ => "processing",
                },
            }),
            error_code: None,
            error_message: None,
        })
    }

    async fn process_refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        let refund_id = format!("re_{}", crypto::generate_short_id());

        Ok(RefundResponse {
            success: true,
            refund_id: Some(refund_id.clone()),
            status: ProviderPaymentStatus::Completed,
            raw_response: json!({
                "id": refund_id,
                "object": "refund",
                "charge": request.provider_transaction_id,
                "amount": request.amount.to_string(),
                "status": "succeeded",
            }),
            error_code: None,
            error_message: None,
        })
    }

    fn parse_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent> {
        if let Some(header) = signature {
            if !self.verify_webhook_signature(payload, header, &self.webhook_secret) {
                return Err(ProviderError::InvalidSignature);
            }
        }

        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::InvalidWebhook(format!("invalid JSON: {e}")))?;

        let event_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidWebhook("missing type".to_string()))?
            .to_string();

        let object = value
            .pointer("/data/object")
            .ok_or_else(|| ProviderError::InvalidWebhook("missing data.object".to_string()))?;

        let transaction_id = object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidWebhook("missing charge id".to_string()))?
            .to_string();

        let status = object
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidWebhook("missing status".to_string()))?;

        Ok(ProviderEvent {
            event_type,
            transaction_id,
            status: Self::normalize_status(status)?,
            raw_payload: value,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], header: &str, secret: &str) -> bool {
        crypto::verify_signature(payload, header, secret).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::money::Currency;

    fn charge(amount: &str) -> ChargeRequest {
        ChargeRequest {
            payment_id: Uuid::new_v4(),
            amount: amount.parse().unwrap(),
            currency: Currency::parse("USD").unwrap(),
            description: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_charge_completes() {
        let provider = StripeProvider::new("whsec");
        let response = provider.process_payment(charge("100.00")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, ProviderPaymentStatus::Completed);
        assert!(response.transaction_id.unwrap().starts_with("ch_"));
    }

    #[tokio::test]
    async fn test_ninety_nine_cents_declines() {
        let provider = StripeProvider::new("whsec");
        let response = provider.process_payment(charge("100.99")).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.status, ProviderPaymentStatus::Failed);
        assert_eq!(response.error_code.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn test_fifty_cents_stays_pending() {
        let provider = StripeProvider::new("whsec");
        let response = provider.process_payment(charge("100.50")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, ProviderPaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_refund_succeeds() {
        let provider = StripeProvider::new("whsec");
        let response = provider
            .process_refund(RefundRequest {
                refund_id: Uuid::new_v4(),
                provider_transaction_id: "ch_abc".to_string(),
                amount: "30.00".parse().unwrap(),
                currency: Currency::parse("USD").unwrap(),
                reason: None,
            })
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.refund_id.unwrap().starts_with("re_"));
    }

    #[test]
    fn test_parse_webhook_normalizes_status() {
        let provider = StripeProvider::new("whsec");
        let payload = serde_json::json!({
            "type": "charge.updated",
            "data": {"object": {"id": "ch_abc", "status": "succeeded"}},
        });
        let event = provider
            .parse_webhook(payload.to_string().as_bytes(), None)
            .unwrap();
        assert_eq!(event.transaction_id, "ch_abc");
        assert_eq!(event.status, ProviderPaymentStatus::Completed);
    }

    #[test]
    fn test_parse_webhook_verifies_signature_when_present() {
        let provider = StripeProvider::new("whsec");
        let payload = serde_json::json!({
            "type": "charge.updated",
            "data": {"object": {"id": "ch_abc", "status": "succeeded"}},
        })
        .to_string();

        let header = crypto::sign_payload(payload.as_bytes(), "whsec", Utc::now().timestamp());
        assert!(provider
            .parse_webhook(payload.as_bytes(), Some(&header))
            .is_ok());

        let bad = crypto::sign_payload(payload.as_bytes(), "wrong", Utc::now().timestamp());
        assert!(provider
            .parse_webhook(payload.as_bytes(), Some(&bad))
            .is_err());
    }
}
