//! Refund service.
//!
//! Refund creation runs under a row-level lock on the target payment so the
//! amount-conservation invariant (completed + pending refunds never exceed
//! the payment amount) holds under concurrency. A provider refusal marks
//! the refund failed and is reported in the result, not thrown.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::breaker::{BreakerError, BreakerRegistry};
use crate::interfaces::provider::{ProviderError, RefundRequest};
use crate::model::{AuditEntry, Payment, PaymentStatus, Refund, RefundStatus};
use crate::money::{format_decimal, Money, MoneyError, SCALE};
use crate::providers::ProviderRegistry;
use crate::services::webhooks::WebhookDeliveryService;
use crate::storage::{self, Database, StorageError};

/// Result type for refund operations.
pub type Result<T> = std::result::Result<T, RefundError>;

/// Errors raised by the refund service.
#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Refund not found")]
    RefundNotFound,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<MoneyError> for RefundError {
    fn from(e: MoneyError) -> Self {
        RefundError::Validation(e.to_string())
    }
}

/// Outcome of a refund attempt: rows plus a success flag, never an
/// exception for an expected provider refusal.
#[derive(Debug, Clone)]
pub struct RefundResult {
    pub refund: Refund,
    pub payment: Payment,
    pub success: bool,
    pub error: Option<String>,
}

/// How much of a payment is still refundable.
#[derive(Debug, Clone, Copy)]
pub struct RefundableSummary {
    pub payment_amount: Decimal,
    pub total_refunded: Decimal,
    pub pending_refunds: Decimal,
    pub available_for_refund: Decimal,
}

/// Refund orchestration.
pub struct RefundService {
    db: Database,
    providers: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    webhooks: Arc<WebhookDeliveryService>,
}

impl RefundService {
    pub fn new(
        db: Database,
        providers: Arc<ProviderRegistry>,
        breakers: Arc<BreakerRegistry>,
        webhooks: Arc<WebhookDeliveryService>,
    ) -> Self {
        Self {
            db,
            providers,
            breakers,
            webhooks,
        }
    }

    /// Create and execute a refund against a payment.
    pub async fn create_refund(
        &self,
        merchant_id: &str,
        payment_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<RefundResult> {
        if amount <= Decimal::ZERO {
            return Err(RefundError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if amount.scale() > SCALE {
            return Err(RefundError::Validation(format!(
                "amount has more than {SCALE} fractional digits"
            )));
        }

        // Phase 1: admit the refund as pending under the payment row lock.
        // Once the pending row is committed it is counted against the
        // available amount, so the provider call can run outside the lock.
        let (payment, refund) = self
            .db
            .transaction::<_, RefundError, _>({
                let merchant_id = merchant_id.to_string();
                let reason = reason.clone();
                move |tx| {
                    Box::pin(async move {
                        let payment = storage::payments::find_for_merchant_for_update(
                            &mut **tx,
                            payment_id,
                            &merchant_id,
                        )
                        .await?
                        .ok_or(RefundError::PaymentNotFound)?;

                        if !payment.status.is_refundable() {
                            return Err(RefundError::Validation(format!(
                                "payment in status {} cannot be refunded",
                                payment.status
                            )));
                        }

                        let totals =
                            storage::refunds::totals_for_payment(&mut **tx, payment.id).await?;
                        let available = Money::new(payment.amount, payment.currency)
                            .checked_sub(&Money::new(totals.completed, payment.currency))?
                            .checked_sub(&Money::new(totals.pending, payment.currency))?;
                        let requested = Money::try_from_decimal(amount, payment.currency)?;
                        if requested.cmp_same_currency(&available)? == std::cmp::Ordering::Greater
                        {
                            return Err(RefundError::Validation(format!(
                                "refund of {} exceeds available {}",
                                requested.format_amount(),
                                format_decimal(available.amount().max(Decimal::ZERO)),
                            )));
                        }

                        let refund = storage::refunds::new_refund(payment.id, amount, reason);
                        storage::refunds::insert(&mut **tx, &refund).await?;
                        storage::audit::insert(
                            &mut **tx,
                            &AuditEntry::merchant(
                                &payment.merchant_id,
                                "refund",
                                refund.id,
                                "refund.created",
                                Some(json!({
                                    "payment_id": payment.id,
                                    "amount": format_decimal(amount),
                                })),
                            ),
                        )
                        .await?;

                        Ok((payment, refund))
                    })
                }
            })
            .await?;

        // Phase 2: the provider call, through the payment's breaker.
        let call_result = self.call_provider(&payment, &refund).await;

        // Phase 3: finalize refund and payment under the row lock again.
        let result = self.finalize(payment.id, refund.id, call_result).await?;

        // Notify outside the lock; the retry pipeline owns failures.
        if result.success {
            if let Some(url) = result.payment.webhook_url.clone() {
                if let Err(e) = self
                    .webhooks
                    .enqueue(
                        Some(result.payment.id),
                        "refund.completed",
                        refund_webhook_payload(&result.refund, &result.payment),
                        &url,
                    )
                    .await
                {
                    warn!(refund_id = %result.refund.id, error = %e, "Webhook enqueue failed");
                }
            }
        }

        Ok(result)
    }

    /// Execute the provider refund; returns the provider refund id or an
    /// error string for the refund row.
    async fn call_provider(
        &self,
        payment: &Payment,
        refund: &Refund,
    ) -> std::result::Result<Option<String>, String> {
        let Some(provider_transaction_id) = payment.provider_transaction_id.clone() else {
            return Err("payment has no provider transaction id".to_string());
        };

        let provider = match self.providers.get(&payment.provider) {
            Ok(provider) => provider,
            Err(e) => return Err(e.to_string()),
        };
        let breaker = self.breakers.get(&payment.provider);

        let request = RefundRequest {
            refund_id: refund.id,
            provider_transaction_id,
            amount: refund.amount,
            currency: payment.currency,
            reason: refund.reason.clone(),
        };

        match breaker.call(provider.process_refund(request)).await {
            Ok(response) if response.success => Ok(response.refund_id),
            Ok(response) => Err(response
                .error_message
                .or(response.error_code)
                .unwrap_or_else(|| "provider refused refund".to_string())),
            Err(BreakerError::Open) => Err("provider circuit open".to_string()),
            Err(BreakerError::Timeout) => Err("provider call timed out".to_string()),
            Err(BreakerError::Inner(e)) => Err(e.to_string()),
        }
    }

    /// Apply the provider outcome: refund terminal status, payment status
    /// propagation, transaction row, audits.
    async fn finalize(
        &self,
        payment_id: Uuid,
        refund_id: Uuid,
        call_result: std::result::Result<Option<String>, String>,
    ) -> Result<RefundResult> {
        self.db
            .transaction::<_, RefundError, _>(move |tx| {
                Box::pin(async move {
                    // Merchant scope was established in phase 1.
                    let payment =
                        storage::payments::find_by_id_for_update(&mut **tx, payment_id)
                            .await?
                            .ok_or(RefundError::PaymentNotFound)?;

                    match call_result {
                        Ok(provider_refund_id) => {
                            storage::refunds::update_status(
                                &mut **tx,
                                refund_id,
                                RefundStatus::Completed,
                                provider_refund_id.as_deref(),
                            )
                            .await?;
                            storage::audit::insert(
                                &mut **tx,
                                &AuditEntry::system(
                                    "refund",
                                    refund_id,
                                    "refund.status_changed",
                                    Some(json!({"status": "pending"})),
                                    Some(json!({"status": "completed"})),
                                ),
                            )
                            .await?;

                            let totals =
                                storage::refunds::totals_for_payment(&mut **tx, payment.id)
                                    .await?;
                            let target = if totals.completed >= payment.amount {
                                PaymentStatus::Refunded
                            } else {
                                PaymentStatus::PartiallyRefunded
                            };

                            let mut updated = payment.clone();
                            if payment.status != target
                                && payment.status.can_transition_to(target)
                            {
                                storage::payments::update_status(
                                    &mut **tx,
                                    payment.id,
                                    target,
                                    None,
                                )
                                .await?;
                                storage::audit::insert(
                                    &mut **tx,
                                    &AuditEntry::system(
                                        "payment",
                                        payment.id,
                                        "payment.status_changed",
                                        Some(json!({"status": payment.status.as_str()})),
                                        Some(json!({"status": target.as_str()})),
                                    ),
                                )
                                .await?;
                                updated.status = target;
                            }
                            storage::payments::insert_transaction(
                                &mut **tx,
                                &storage::payments::new_transaction(
                                    payment.id,
                                    updated.status,
                                    None,
                                    None,
                                ),
                            )
                            .await?;

                            let refund = storage::refunds::find_for_merchant(
                                &mut **tx,
                                refund_id,
                                &updated.merchant_id,
                            )
                            .await?
                            .ok_or(RefundError::RefundNotFound)?;

                            info!(
                                refund_id = %refund.id,
                                payment_id = %updated.id,
                                payment_status = %updated.status,
                                "Refund completed"
                            );

                            Ok(RefundResult {
                                refund,
                                payment: updated,
                                success: true,
                                error: None,
                            })
                        }
                        Err(error) => {
                            storage::refunds::update_status(
                                &mut **tx,
                                refund_id,
                                RefundStatus::Failed,
                                None,
                            )
                            .await?;
                            storage::audit::insert(
                                &mut **tx,
                                &AuditEntry::system(
                                    "refund",
                                    refund_id,
                                    "refund.status_changed",
                                    Some(json!({"status": "pending"})),
                                    Some(json!({"status": "failed", "error": error})),
                                ),
                            )
                            .await?;

                            let refund = storage::refunds::find_for_merchant(
                                &mut **tx,
                                refund_id,
                                &payment.merchant_id,
                            )
                            .await?
                            .ok_or(RefundError::RefundNotFound)?;

                            warn!(
                                refund_id = %refund.id,
                                payment_id = %payment.id,
                                error = %error,
                                "Refund failed"
                            );

                            Ok(RefundResult {
                                refund,
                                payment,
                                success: false,
                                error: Some(error),
                            })
                        }
                    }
                })
            })
            .await
    }

    /// How much of a payment remains refundable.
    pub async fn refundable(
        &self,
        merchant_id: &str,
        payment_id: Uuid,
    ) -> Result<RefundableSummary> {
        let payment =
            storage::payments::find_for_merchant(self.db.pool(), payment_id, merchant_id)
                .await?
                .ok_or(RefundError::PaymentNotFound)?;

        let totals = storage::refunds::totals_for_payment(self.db.pool(), payment.id).await?;
        let available = (payment.amount - totals.completed - totals.pending).max(Decimal::ZERO);

        Ok(RefundableSummary {
            payment_amount: payment.amount,
            total_refunded: totals.completed,
            pending_refunds: totals.pending,
            available_for_refund: available,
        })
    }

    /// Fetch a refund, merchant-scoped through its payment.
    pub async fn get_refund(&self, merchant_id: &str, id: Uuid) -> Result<Refund> {
        storage::refunds::find_for_merchant(self.db.pool(), id, merchant_id)
            .await?
            .ok_or(RefundError::RefundNotFound)
    }
}

/// Canonical refund payload for merchant webhooks.
pub fn refund_webhook_payload(refund: &Refund, payment: &Payment) -> serde_json::Value {
    json!({
        "refund_id": refund.id,
        "payment_id": payment.id,
        "amount": format_decimal(refund.amount),
        "currency": payment.currency.as_str(),
        "status": refund.status.as_str(),
        "payment_status": payment.status.as_str(),
        "provider_refund_id": refund.provider_refund_id,
    })
}
