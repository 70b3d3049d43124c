//! End-to-end service flows against a live PostgreSQL.
//!
//! These exercise the charge saga, refund conservation, reconciliation, the
//! idempotency gate, and the webhook retry schedule with in-memory cache,
//! queue, and transport doubles. Run with:
//!
//! ```text
//! DATABASE_URL=postgres://localhost:5432/payrail_test cargo test -- --ignored
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use payrail::breaker::BreakerRegistry;
use payrail::cache::MemoryCache;
use payrail::config::{BreakerConfig, IdempotencyConfig, PostgresConfig, WebhookConfig};
use payrail::idempotency::{fingerprint, CheckOutcome, IdempotencyEngine, StartOutcome};
use payrail::interfaces::provider::ProviderEvent;
use payrail::interfaces::Cache;
use payrail::model::{PaymentStatus, RefundStatus, WebhookStatus};
use payrail::providers::ProviderRegistry;
use payrail::queue::MemoryJobQueue;
use payrail::services::payments::{CreatePayment, PaymentService, ReconcileOutcome};
use payrail::services::refunds::RefundService;
use payrail::services::webhooks::{
    DeliveryHeaders, SendOutcome, TransportError, WebhookDeliveryService, WebhookTransport,
};
use payrail::storage::Database;

/// Transport double that replays a scripted sequence of HTTP statuses.
struct ScriptedTransport {
    statuses: Mutex<VecDeque<u16>>,
    posts: Mutex<Vec<(String, Vec<u8>, String)>>,
}

impl ScriptedTransport {
    fn new(statuses: Vec<u16>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            posts: Mutex::new(Vec::new()),
        }
    }

    async fn post_count(&self) -> usize {
        self.posts.lock().await.len()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &DeliveryHeaders,
    ) -> Result<u16, TransportError> {
        self.posts
            .lock()
            .await
            .push((url.to_string(), body.to_vec(), headers.signature.clone()));
        Ok(self.statuses.lock().await.pop_front().unwrap_or(200))
    }
}

struct Harness {
    db: Database,
    payments: Arc<PaymentService>,
    refunds: Arc<RefundService>,
    webhooks: Arc<WebhookDeliveryService>,
    idempotency: Arc<IdempotencyEngine>,
    transport: Arc<ScriptedTransport>,
    merchant_id: String,
}

async fn harness(transport_statuses: Vec<u16>) -> Harness {
    let uri = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/payrail_test".to_string());
    let db = Database::connect(&PostgresConfig {
        uri,
        ..Default::default()
    })
    .await
    .expect("postgres reachable");

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let transport = Arc::new(ScriptedTransport::new(transport_statuses));

    let webhook_config = WebhookConfig {
        secret: "whsec_test".to_string(),
        ..Default::default()
    };
    let webhooks = Arc::new(WebhookDeliveryService::new(
        db.clone(),
        queue,
        transport.clone(),
        webhook_config,
    ));

    let providers = Arc::new(ProviderRegistry::with_defaults("whsec_test"));
    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));

    let payments = Arc::new(PaymentService::new(
        db.clone(),
        providers.clone(),
        breakers.clone(),
        webhooks.clone(),
    ));
    let refunds = Arc::new(RefundService::new(
        db.clone(),
        providers,
        breakers,
        webhooks.clone(),
    ));
    let idempotency = Arc::new(IdempotencyEngine::new(
        db.clone(),
        cache,
        IdempotencyConfig::default(),
    ));

    Harness {
        db,
        payments,
        refunds,
        webhooks,
        idempotency,
        transport,
        merchant_id: format!("m_{}", Uuid::new_v4().simple()),
    }
}

fn charge(amount: &str, provider: &str) -> CreatePayment {
    CreatePayment {
        amount: amount.parse::<Decimal>().unwrap(),
        currency: "USD".to_string(),
        provider: provider.to_string(),
        description: Some("integration".to_string()),
        external_id: None,
        metadata: None,
        webhook_url: None,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn happy_path_charge_completes() {
    let h = harness(vec![]).await;

    let result = h
        .payments
        .create_payment(&h.merchant_id, charge("100.00", "stripe"))
        .await
        .unwrap();

    assert_eq!(result.payment.status, PaymentStatus::Completed);
    assert!(result
        .payment
        .provider_transaction_id
        .as_deref()
        .unwrap()
        .starts_with("ch_"));
    assert!(result.error_code.is_none());

    let (payment, transactions, refunds) = h
        .payments
        .get_payment(&h.merchant_id, result.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    // pending, processing, completed
    assert_eq!(transactions.len(), 3);
    assert!(refunds.is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn declined_charge_is_a_result_not_an_error() {
    let h = harness(vec![]).await;

    let result = h
        .payments
        .create_payment(&h.merchant_id, charge("100.99", "stripe"))
        .await
        .unwrap();

    assert_eq!(result.payment.status, PaymentStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("card_declined"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn pending_charge_reconciles_to_completed() {
    let h = harness(vec![]).await;

    let result = h
        .payments
        .create_payment(&h.merchant_id, charge("100.50", "stripe"))
        .await
        .unwrap();
    assert_eq!(result.payment.status, PaymentStatus::Pending);

    let transaction_id = result.payment.provider_transaction_id.clone().unwrap();
    let event = ProviderEvent {
        event_type: "charge.updated".to_string(),
        transaction_id: transaction_id.clone(),
        status: payrail::interfaces::provider::ProviderPaymentStatus::Completed,
        raw_payload: serde_json::json!({"id": transaction_id, "status": "succeeded"}),
    };

    let outcome = h
        .payments
        .reconcile_provider_event("stripe", &event)
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));

    let (payment, _, _) = h
        .payments
        .get_payment(&h.merchant_id, result.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    // A terminal-state report for the same transaction cannot regress.
    let regress = ProviderEvent {
        status: payrail::interfaces::provider::ProviderPaymentStatus::Pending,
        ..event
    };
    let outcome = h
        .payments
        .reconcile_provider_event("stripe", &regress)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::InvalidTransition { .. }
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn partial_then_full_refund_conserves_amount() {
    let h = harness(vec![]).await;

    let payment = h
        .payments
        .create_payment(&h.merchant_id, charge("100.00", "stripe"))
        .await
        .unwrap()
        .payment;

    let first = h
        .refunds
        .create_refund(
            &h.merchant_id,
            payment.id,
            "30.00".parse().unwrap(),
            Some("partial".to_string()),
        )
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(first.refund.status, RefundStatus::Completed);
    assert_eq!(first.payment.status, PaymentStatus::PartiallyRefunded);

    let summary = h.refunds.refundable(&h.merchant_id, payment.id).await.unwrap();
    assert_eq!(summary.available_for_refund, "70".parse::<Decimal>().unwrap());

    let second = h
        .refunds
        .create_refund(&h.merchant_id, payment.id, "70.00".parse().unwrap(), None)
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(second.payment.status, PaymentStatus::Refunded);

    let excess = h
        .refunds
        .create_refund(&h.merchant_id, payment.id, "1.00".parse().unwrap(), None)
        .await;
    assert!(excess.is_err(), "over-refund must be rejected");
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn idempotency_gate_replays_and_conflicts() {
    let h = harness(vec![]).await;
    let key = format!("K-{}", Uuid::new_v4().simple());
    let body = serde_json::json!({"amount": "100.00", "currency": "USD"});
    let fp = fingerprint(&body, "/api/v1/payments", "POST");

    assert_eq!(
        h.idempotency.check(&key, &h.merchant_id, &fp).await.unwrap(),
        CheckOutcome::Miss
    );

    let started = h
        .idempotency
        .start_processing(&key, &h.merchant_id, &fp, "/api/v1/payments", "POST")
        .await
        .unwrap();
    assert_eq!(started, StartOutcome::Started);

    // Losers of the race observe the in-flight record.
    assert_eq!(
        h.idempotency.check(&key, &h.merchant_id, &fp).await.unwrap(),
        CheckOutcome::InFlight
    );

    // A different fingerprint under the same key is a conflict.
    let other = fingerprint(
        &serde_json::json!({"amount": "200.00", "currency": "USD"}),
        "/api/v1/payments",
        "POST",
    );
    assert!(h
        .idempotency
        .check(&key, &h.merchant_id, &other)
        .await
        .is_err());

    h.idempotency
        .complete(&key, &h.merchant_id, "{\"id\":\"p_1\"}", 201)
        .await
        .unwrap();

    assert_eq!(
        h.idempotency.check(&key, &h.merchant_id, &fp).await.unwrap(),
        CheckOutcome::Replay {
            body: "{\"id\":\"p_1\"}".to_string(),
            status_code: 201
        }
    );

    h.idempotency.remove(&key, &h.merchant_id).await.unwrap();
    assert_eq!(
        h.idempotency.check(&key, &h.merchant_id, &fp).await.unwrap(),
        CheckOutcome::Miss
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn webhook_retries_until_destination_recovers() {
    // 500 three times, then 200.
    let h = harness(vec![500, 500, 500, 200]).await;

    let event = h
        .webhooks
        .enqueue(
            None,
            "payment.completed",
            serde_json::json!({"payment_id": "p_1"}),
            "https://merchant.example.com/hooks",
        )
        .await
        .unwrap();
    assert_eq!(event.status, WebhookStatus::Pending);
    assert_eq!(event.max_attempts, 5);

    for expected_attempts in 1..=3 {
        let outcome = h.webhooks.send(event.id).await.unwrap();
        assert_eq!(outcome, SendOutcome::RetryScheduled);

        let row = payrail::storage::webhooks::find(h.db.pool(), event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.attempts, expected_attempts);
        assert_eq!(row.status, WebhookStatus::Pending);
        assert!(row.next_retry_at.is_some());
    }

    let outcome = h.webhooks.send(event.id).await.unwrap();
    assert_eq!(outcome, SendOutcome::Delivered);

    let row = payrail::storage::webhooks::find(h.db.pool(), event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, WebhookStatus::Sent);
    assert_eq!(row.attempts, 4);
    assert!(row.sent_at.is_some());
    assert_eq!(h.transport.post_count().await, 4);

    // A delivered event is never re-sent.
    assert_eq!(h.webhooks.send(event.id).await.unwrap(), SendOutcome::AlreadySent);
    assert_eq!(h.transport.post_count().await, 4);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn webhook_exhausts_after_max_attempts() {
    let h = harness(vec![500; 10]).await;

    let event = h
        .webhooks
        .enqueue(
            None,
            "payment.completed",
            serde_json::json!({"payment_id": "p_1"}),
            "https://merchant.example.com/hooks",
        )
        .await
        .unwrap();

    for _ in 0..4 {
        assert_eq!(
            h.webhooks.send(event.id).await.unwrap(),
            SendOutcome::RetryScheduled
        );
    }
    assert_eq!(
        h.webhooks.send(event.id).await.unwrap(),
        SendOutcome::PermanentlyFailed
    );

    let row = payrail::storage::webhooks::find(h.db.pool(), event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, WebhookStatus::Failed);
    assert_eq!(row.attempts, row.max_attempts);
    assert!(row.last_error.is_some());

    // Exhausted events are refused, not retried.
    assert_eq!(h.webhooks.send(event.id).await.unwrap(), SendOutcome::Exhausted);
    assert_eq!(h.transport.post_count().await, 5);

    // Allow any stray delayed-publish tasks to settle before teardown.
    tokio::time::sleep(Duration::from_millis(10)).await;
}
