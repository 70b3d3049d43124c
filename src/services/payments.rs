//! Payment service: charge orchestration and provider reconciliation.
//!
//! A charge runs as a three-step saga: persist, invoke the provider through
//! its circuit breaker, enqueue the merchant webhook. A provider decline is
//! a normal terminal outcome recorded on the payment, never a saga error;
//! compensation fires only for infrastructure failures and marks the
//! payment failed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::breaker::{BreakerError, BreakerRegistry};
use crate::crypto;
use crate::interfaces::provider::{
    ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, ProviderEvent,
    ProviderPaymentStatus,
};
use crate::model::{AuditEntry, Payment, PaymentStatus, Refund, Transaction};
use crate::money::{format_decimal, Currency, Money, MoneyError};
use crate::providers::ProviderRegistry;
use crate::saga::Saga;
use crate::services::webhooks::WebhookDeliveryService;
use crate::storage::{self, Database, StorageError};

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors raised by the payment service.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment not found")]
    NotFound,

    #[error("External id already used: {0}")]
    DuplicateExternalId(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider circuit open: {0}")]
    CircuitOpen(String),

    #[error("Provider call timed out: {0}")]
    ProviderTimeout(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<MoneyError> for PaymentError {
    fn from(e: MoneyError) -> Self {
        PaymentError::Validation(e.to_string())
    }
}

impl<E: Into<PaymentError>> From<BreakerError<E>> for PaymentError {
    fn from(e: BreakerError<E>) -> Self {
        match e {
            BreakerError::Open => PaymentError::CircuitOpen("breaker rejected call".to_string()),
            BreakerError::Timeout => {
                PaymentError::ProviderTimeout("call exceeded deadline".to_string())
            }
            BreakerError::Inner(inner) => inner.into(),
        }
    }
}

/// A validated charge request.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub metadata: Option<Value>,
    pub webhook_url: Option<String>,
}

/// Outcome of a charge, successful or declined.
#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub payment: Payment,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Outcome of applying a provider-originated status update.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Status applied; payment returned in its new state.
    Updated(Payment),
    /// No payment carries this provider transaction id.
    UnknownTransaction,
    /// The payment is already in the reported state.
    NoChange,
    /// The transition is invalid; ignored but logged.
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

/// Saga context for a charge.
#[derive(Clone)]
struct ChargeContext {
    payment: Payment,
    response: Option<ChargeResponse>,
}

/// Payment orchestration.
pub struct PaymentService {
    db: Database,
    providers: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    webhooks: Arc<WebhookDeliveryService>,
}

impl PaymentService {
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

    /// Validate a charge request and derive its currency.
    fn validate(&self, input: &CreatePayment) -> Result<Currency> {
        if !self.providers.contains(&input.provider) {
            return Err(PaymentError::Validation(format!(
                "provider not registered: {}",
                input.provider
            )));
        }

        let currency = Currency::parse(&input.currency)?;
        let amount = Money::try_from_decimal(input.amount, currency)?;
        if !amount.is_positive() {
            return Err(PaymentError::Validation(
                "amount must be positive".to_string(),
            ));
        }

        if let Some(url) = &input.webhook_url {
            self.webhooks
                .validate_url(url)
                .map_err(|e| PaymentError::Validation(e.to_string()))?;
        }

        Ok(currency)
    }

    /// Execute a charge end to end.
    pub async fn create_payment(
        &self,
        merchant_id: &str,
        input: CreatePayment,
    ) -> Result<ChargeResult> {
        let currency = self.validate(&input)?;

        let now = Utc::now();
        let payment = Payment {
            id: crypto::generate_entity_id(),
            external_id: input.external_id.clone(),
            merchant_id: merchant_id.to_string(),
            amount: input.amount,
            currency,
            status: PaymentStatus::Pending,
            provider: input.provider.to_ascii_lowercase(),
            provider_transaction_id: None,
            description: input.description.clone(),
            metadata: input.metadata.clone().unwrap_or_else(|| json!({})),
            webhook_url: input.webhook_url.clone(),
            created_at: now,
            updated_at: now,
        };

        let context = ChargeContext {
            payment,
            response: None,
        };

        let saga = Saga::<ChargeContext, PaymentError>::new("charge")
            .step_with_compensation(
                "persist-payment",
                {
                    let db = self.db.clone();
                    move |ctx: ChargeContext| Box::pin(persist_payment(db, ctx))
                },
                {
                    let db = self.db.clone();
                    move |ctx: &ChargeContext| Box::pin(mark_payment_failed(db, ctx))
                },
            )
            .step("invoke-provider", {
                let db = self.db.clone();
                let providers = self.providers.clone();
                let breakers = self.breakers.clone();
                move |ctx: ChargeContext| Box::pin(invoke_provider(db, providers, breakers, ctx))
            })
            .step("enqueue-webhook", {
                let webhooks = self.webhooks.clone();
                move |ctx: ChargeContext| Box::pin(enqueue_status_webhook(webhooks, ctx))
            });

        let outcome = saga.execute(context).await;

        match outcome.error {
            None => {
                let ctx = outcome.context;
                info!(
                    payment_id = %ctx.payment.id,
                    status = %ctx.payment.status,
                    provider = %ctx.payment.provider,
                    "Charge finished"
                );
                Ok(ChargeResult {
                    error_code: ctx.response.as_ref().and_then(|r| r.error_code.clone()),
                    error_message: ctx.response.as_ref().and_then(|r| r.error_message.clone()),
                    payment: ctx.payment,
                })
            }
            Some(e) => {
                warn!(
                    failed_step = outcome.failed_step.unwrap_or("?"),
                    error = %e,
                    "Charge saga failed"
                );
                Err(e)
            }
        }
    }

    /// Apply a provider webhook to the payment it references.
    ///
    /// The payment row is locked for the duration of the check-and-update,
    /// serializing concurrent reconciliation and refund activity.
    pub async fn reconcile_provider_event(
        &self,
        provider_name: &str,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome> {
        let target = match event.status {
            ProviderPaymentStatus::Pending => PaymentStatus::Pending,
            ProviderPaymentStatus::Completed => PaymentStatus::Completed,
            ProviderPaymentStatus::Failed => PaymentStatus::Failed,
        };

        let provider_name = provider_name.to_ascii_lowercase();
        let transaction_id = event.transaction_id.clone();
        let raw_payload = event.raw_payload.clone();

        let outcome = self
            .db
            .transaction::<_, PaymentError, _>(move |tx| {
                Box::pin(async move {
                    let payment = storage::payments::find_by_provider_transaction_for_update(
                        &mut **tx,
                        &transaction_id,
                        &provider_name,
                    )
                    .await?;

                    let Some(payment) = payment else {
                        return Ok(ReconcileOutcome::UnknownTransaction);
                    };

                    if payment.status == target {
                        return Ok(ReconcileOutcome::NoChange);
                    }

                    if !payment.status.can_transition_to(target) {
                        return Ok(ReconcileOutcome::InvalidTransition {
                            from: payment.status,
                            to: target,
                        });
                    }

                    storage::payments::update_status(&mut **tx, payment.id, target, None).await?;
                    storage::payments::insert_transaction(
                        &mut **tx,
                        &storage::payments::new_transaction(
                            payment.id,
                            target,
                            Some(raw_payload),
                            None,
                        ),
                    )
                    .await?;

                    let mut audit = AuditEntry::system(
                        "payment",
                        payment.id,
                        "payment.status_changed",
                        Some(json!({"status": payment.status.as_str()})),
                        Some(json!({"status": target.as_str()})),
                    );
                    audit.actor = payment.provider.clone();
                    audit.actor_type = crate::model::AuditActorType::Provider;
                    storage::audit::insert(&mut **tx, &audit).await?;

                    let mut updated = payment;
                    updated.status = target;
                    updated.updated_at = Utc::now();
                    Ok(ReconcileOutcome::Updated(updated))
                })
            })
            .await?;

        match &outcome {
            ReconcileOutcome::Updated(payment) => {
                info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "Reconciled provider status update"
                );
                if let Some(url) = payment.webhook_url.clone() {
                    let event_type = format!("payment.{}", payment.status);
                    if let Err(e) = self
                        .webhooks
                        .enqueue(
                            Some(payment.id),
                            &event_type,
                            payment_webhook_payload(payment),
                            &url,
                        )
                        .await
                    {
                        warn!(payment_id = %payment.id, error = %e, "Webhook enqueue failed");
                    }
                }
            }
            ReconcileOutcome::UnknownTransaction => {
                warn!(
                    transaction_id = %event.transaction_id,
                    "Provider webhook references unknown transaction"
                );
            }
            ReconcileOutcome::InvalidTransition { from, to } => {
                warn!(
                    transaction_id = %event.transaction_id,
                    from = %from,
                    to = %to,
                    "Ignoring invalid provider-driven transition"
                );
            }
            ReconcileOutcome::NoChange => {}
        }

        Ok(outcome)
    }

    /// A payment with its transaction log and refunds, merchant-scoped.
    pub async fn get_payment(
        &self,
        merchant_id: &str,
        id: Uuid,
    ) -> Result<(Payment, Vec<Transaction>, Vec<Refund>)> {
        let payment = storage::payments::find_for_merchant(self.db.pool(), id, merchant_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        let transactions =
            storage::payments::transactions_for_payment(self.db.pool(), payment.id).await?;
        let refunds = storage::refunds::list_for_payment(self.db.pool(), payment.id).await?;

        Ok((payment, transactions, refunds))
    }

    /// A page of the merchant's payments plus the total count.
    pub async fn list_payments(
        &self,
        merchant_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Payment>, u64)> {
        Ok(storage::payments::list_for_merchant(self.db.pool(), merchant_id, limit, offset).await?)
    }

    /// Provider lookup for webhook handling.
    pub fn provider(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        Ok(self.providers.get(name)?)
    }
}

/// Step 1: insert the pending payment, its first transaction row, and the
/// creation audit entry, all in one transaction.
async fn persist_payment(db: Database, ctx: ChargeContext) -> Result<ChargeContext> {
    let payment = ctx.payment.clone();

    let result = db
        .transaction::<_, PaymentError, _>(move |tx| {
            Box::pin(async move {
                storage::payments::insert(&mut **tx, &payment).await?;
                storage::payments::insert_transaction(
                    &mut **tx,
                    &storage::payments::new_transaction(
                        payment.id,
                        PaymentStatus::Pending,
                        None,
                        None,
                    ),
                )
                .await?;
                storage::audit::insert(
                    &mut **tx,
                    &AuditEntry::merchant(
                        &payment.merchant_id,
                        "payment",
                        payment.id,
                        "payment.created",
                        Some(payment_webhook_payload(&payment)),
                    ),
                )
                .await?;
                Ok(())
            })
        })
        .await;

    match result {
        Ok(()) => Ok(ctx),
        Err(PaymentError::Storage(StorageError::Sqlx(e)))
            if storage::payments::is_external_id_conflict(&e) =>
        {
            Err(PaymentError::DuplicateExternalId(
                ctx.payment.external_id.clone().unwrap_or_default(),
            ))
        }
        Err(e) => Err(e),
    }
}

/// Compensation for step 1: park the payment in `failed` with an audit
/// entry. Runs only when a later step failed with an infrastructure error.
async fn mark_payment_failed(db: Database, ctx: &ChargeContext) -> Result<()> {
    let payment_id = ctx.payment.id;
    let prior = ctx.payment.status;

    db.transaction::<_, PaymentError, _>(move |tx| {
        Box::pin(async move {
            storage::payments::update_status(&mut **tx, payment_id, PaymentStatus::Failed, None)
                .await?;
            storage::audit::insert(
                &mut **tx,
                &AuditEntry::system(
                    "payment",
                    payment_id,
                    "payment.status_changed",
                    Some(json!({"status": prior.as_str()})),
                    Some(json!({"status": PaymentStatus::Failed.as_str()})),
                ),
            )
            .await?;
            Ok(())
        })
    })
    .await
}

/// Step 2: flip to processing, call the provider through its breaker, and
/// record the mapped outcome.
async fn invoke_provider(
    db: Database,
    providers: Arc<ProviderRegistry>,
    breakers: Arc<BreakerRegistry>,
    mut ctx: ChargeContext,
) -> Result<ChargeContext> {
    let provider = providers.get(&ctx.payment.provider)?;
    let breaker = breakers.get(&ctx.payment.provider);

    // Record the processing hop before the remote call.
    db.transaction::<_, PaymentError, _>({
        let payment_id = ctx.payment.id;
        move |tx| {
            Box::pin(async move {
                storage::payments::update_status(
                    &mut **tx,
                    payment_id,
                    PaymentStatus::Processing,
                    None,
                )
                .await?;
                storage::payments::insert_transaction(
                    &mut **tx,
                    &storage::payments::new_transaction(
                        payment_id,
                        PaymentStatus::Processing,
                        None,
                        None,
                    ),
                )
                .await?;
                Ok(())
            })
        }
    })
    .await?;
    ctx.payment.status = PaymentStatus::Processing;

    let request = ChargeRequest {
        payment_id: ctx.payment.id,
        amount: ctx.payment.amount,
        currency: ctx.payment.currency,
        description: ctx.payment.description.clone(),
        metadata: metadata_as_strings(&ctx.payment.metadata),
    };

    let response: ChargeResponse = breaker
        .call(provider.process_payment(request))
        .await
        .map_err(PaymentError::from)?;

    // Declines are data, not errors: map them onto the payment.
    let next_status = if !response.success {
        PaymentStatus::Failed
    } else if response.status == ProviderPaymentStatus::Completed {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Pending
    };

    let payment_id = ctx.payment.id;
    let prior = ctx.payment.status;
    let provider_txn = response.transaction_id.clone();
    let raw = response.raw_response.clone();
    let error_message = response.error_message.clone();

    db.transaction::<_, PaymentError, _>(move |tx| {
        Box::pin(async move {
            storage::payments::update_status(
                &mut **tx,
                payment_id,
                next_status,
                provider_txn.as_deref(),
            )
            .await?;
            storage::payments::insert_transaction(
                &mut **tx,
                &storage::payments::new_transaction(
                    payment_id,
                    next_status,
                    Some(raw),
                    error_message,
                ),
            )
            .await?;
            storage::audit::insert(
                &mut **tx,
                &AuditEntry::system(
                    "payment",
                    payment_id,
                    "payment.status_changed",
                    Some(json!({"status": prior.as_str()})),
                    Some(json!({"status": next_status.as_str()})),
                ),
            )
            .await?;
            Ok(())
        })
    })
    .await?;

    ctx.payment.status = next_status;
    ctx.payment.provider_transaction_id = response.transaction_id.clone();
    ctx.payment.updated_at = Utc::now();
    ctx.response = Some(response);
    Ok(ctx)
}

/// Step 3: enqueue the merchant notification. Delivery problems are owned by
/// the retry pipeline and never fail a charge that already happened.
async fn enqueue_status_webhook(
    webhooks: Arc<WebhookDeliveryService>,
    ctx: ChargeContext,
) -> Result<ChargeContext> {
    if let Some(url) = ctx.payment.webhook_url.clone() {
        let event_type = format!("payment.{}", ctx.payment.status);
        if let Err(e) = webhooks
            .enqueue(
                Some(ctx.payment.id),
                &event_type,
                payment_webhook_payload(&ctx.payment),
                &url,
            )
            .await
        {
            warn!(payment_id = %ctx.payment.id, error = %e, "Webhook enqueue failed");
        }
    }
    Ok(ctx)
}

/// Canonical payment payload for merchant webhooks and audit entries.
pub fn payment_webhook_payload(payment: &Payment) -> Value {
    json!({
        "payment_id": payment.id,
        "external_id": payment.external_id,
        "merchant_id": payment.merchant_id,
        "amount": format_decimal(payment.amount),
        "currency": payment.currency.as_str(),
        "status": payment.status.as_str(),
        "provider": payment.provider,
        "provider_transaction_id": payment.provider_transaction_id,
    })
}

/// Flatten string-valued metadata for provider requests.
fn metadata_as_strings(metadata: &Value) -> HashMap<String, String> {
    metadata
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
