//! Application state shared across handlers.

use std::sync::Arc;

use crate::breaker::BreakerRegistry;
use crate::config::Config;
use crate::idempotency::IdempotencyEngine;
use crate::interfaces::Cache;
use crate::providers::ProviderRegistry;
use crate::services::{PaymentService, RefundService, WebhookDeliveryService};
use crate::storage::Database;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub cache: Arc<dyn Cache>,
    pub providers: Arc<ProviderRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub payments: Arc<PaymentService>,
    pub refunds: Arc<RefundService>,
    pub webhooks: Arc<WebhookDeliveryService>,
    pub idempotency: Arc<IdempotencyEngine>,
}
