//! PayPal-style provider.
//!
//! Transaction ids are `PAY-<HEX>`, refund ids `REF-<HEX>`. Webhook
//! signatures use a `ts=<unix>;sig=<hex>` header over `"<ts>;<payload>"`,
//! with the same 300 second tolerance as the other providers.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::crypto;
use crate::interfaces::provider::{
    ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, ProviderEvent,
    ProviderPaymentStatus, RefundRequest, RefundResponse, Result,
};

use super::stripe;

/// Simulated PayPal processor.
pub struct PaypalProvider {
    webhook_secret: String,
}

impl PaypalProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    fn transaction_id() -> String {
        format!("PAY-{}", crypto::generate_short_id().to_ascii_uppercase())
    }

    fn normalize_status(status: &str) -> Result<ProviderPaymentStatus> {
        match status {
            "COMPLETED" => Ok(ProviderPaymentStatus::Completed),
            "PENDING" | "CREATED" => Ok(ProviderPaymentStatus::Pending),
            "DENIED" | "FAILED" | "VOIDED" => Ok(ProviderPaymentStatus::Failed),
            other => Err(ProviderError::InvalidWebhook(format!(
                "unknown status: {other}"
            ))),
        }
    }

    /// Sign a payload the way the simulated remote does (used in tests and
    /// by the provider's own verification).
    pub fn sign(payload: &[u8], secret: &str, ts: i64) -> String {
        let mut signed = ts.to_string().into_bytes();
        signed.push(b';');
        signed.extend_from_slice(payload);
        format!("ts={};sig={}", ts, crypto::sign_hmac_sha256(&signed, secret))
    }
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    fn name(&self) -> &str {
        "paypal"
    }

    fn signature_header(&self) -> &'static str {
        "Paypal-Signature"
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeResponse> {
        let transaction_id = Self::transaction_id();

        if stripe::declines_amount(request.amount) {
            return Ok(ChargeResponse {
                success: false,
                transaction_id: Some(transaction_id.clone()),
                status: ProviderPaymentStatus::Failed,
                raw_response: json!({
                    "id": transaction_id,
                    "status": "DENIED",
                    "reason": "INSTRUMENT_DECLINED",
                }),
                error_code: Some("INSTRUMENT_DECLINED".to_string()),
                error_message: Some("The instrument presented was declined.".to_string()),
            });
        }

        let pending = stripe::pending_amount(request.amount);
        let status_str = if pending { "PENDING" } else { "COMPLETED" };

        Ok(ChargeResponse {
            success: true,
            transaction_id: Some(transaction_id.clone()),
            status: if pending {
                ProviderPaymentStatus::Pending
            } else {
                ProviderPaymentStatus::Completed
            },
            raw_response: json!({
                "id": transaction_id,
                "status": status_str,
                "amount": {
                    "value": request.amount.to_string(),
                    "currency_code": request.currency.as_str(),
                },
            }),
            error_code: None,
            error_message: None,
        })
    }

    async fn process_refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        let refund_id = format!("REF-{}", crypto::generate_short_id().to_ascii_uppercase());

        Ok(RefundResponse {
            success: true,
            refund_id: Some(refund_id.clone()),
            status: ProviderPaymentStatus::Completed,
            raw_response: json!({
                "id": refund_id,
                "capture_id": request.provider_transaction_id,
                "status": "COMPLETED",
                "amount": {
                    "value": request.amount.to_string(),
                    "currency_code": request.currency.as_str(),
                },
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
            .get("event_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidWebhook("missing event_type".to_string()))?
            .to_string();

        let resource = value
            .get("resource")
            .ok_or_else(|| ProviderError::InvalidWebhook("missing resource".to_string()))?;

        let transaction_id = resource
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidWebhook("missing resource id".to_string()))?
            .to_string();

        let status = resource
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
        let mut ts = None;
        let mut sig = None;
        for part in header.split(';') {
            match part.split_once('=') {
                Some(("ts", value)) => ts = value.parse::<i64>().ok(),
                Some(("sig", value)) => sig = Some(value),
                _ => {}
            }
        }

        let (Some(ts), Some(sig)) = (ts, sig) else {
            return false;
        };

        if (Utc::now().timestamp() - ts).unsigned_abs()
            > crypto::SIGNATURE_TOLERANCE.as_secs()
        {
            return false;
        }

        let mut signed = ts.to_string().into_bytes();
        signed.push(b';');
        signed.extend_from_slice(payload);
        crypto::verify_hmac_sha256(&signed, sig, secret)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use uuid::Uuid;

    use super::*;
    use crate::money::Currency;

    fn charge(amount: &str) -> ChargeRequest {
        ChargeRequest {
            payment_id: Uuid::new_v4(),
            amount: amount.parse().unwrap(),
            currency: Currency::parse("EUR").unwrap(),
            description: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_charge_outcomes_follow_cents_convention() {
        let provider = PaypalProvider::new("whsec");

        let ok = provider.process_payment(charge("10.00")).await.unwrap();
        assert!(ok.success);
        assert!(ok.transaction_id.unwrap().starts_with("PAY-"));

        let declined = provider.process_payment(charge("10.99")).await.unwrap();
        assert!(!declined.success);
        assert_eq!(declined.error_code.as_deref(), Some("INSTRUMENT_DECLINED"));

        let pending = provider.process_payment(charge("10.50")).await.unwrap();
        assert_eq!(pending.status, ProviderPaymentStatus::Pending);
    }

    #[test]
    fn test_signature_round_trip() {
        let provider = PaypalProvider::new("whsec");
        let payload = br#"{"event_type":"PAYMENT.CAPTURE.COMPLETED"}"#;
        let header = PaypalProvider::sign(payload, "whsec", Utc::now().timestamp());

        assert!(provider.verify_webhook_signature(payload, &header, "whsec"));
        assert!(!provider.verify_webhook_signature(payload, &header, "wrong"));
        assert!(!provider.verify_webhook_signature(b"other", &header, "whsec"));
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let provider = PaypalProvider::new("whsec");
        let payload = b"{}";
        let header = PaypalProvider::sign(payload, "whsec", Utc::now().timestamp() - 301);
        assert!(!provider.verify_webhook_signature(payload, &header, "whsec"));
    }

    #[test]
    fn test_parse_webhook() {
        let provider = PaypalProvider::new("whsec");
        let payload = serde_json::json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {"id": "PAY-ABC123", "status": "COMPLETED"},
        });
        let event = provider
            .parse_webhook(payload.to_string().as_bytes(), None)
            .unwrap();
        assert_eq!(event.transaction_id, "PAY-ABC123");
        assert_eq!(event.status, ProviderPaymentStatus::Completed);
    }
}
