//! Abstract interfaces for payrail components.
//!
//! These traits define the contracts for:
//! - Key-value cache (idempotency mirror tier)
//! - Durable job queue (webhook delivery)
//! - Payment providers (external processors)

pub mod cache;
pub mod provider;
pub mod queue;

pub use cache::{Cache, CacheError};
pub use provider::{
    ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, ProviderEvent,
    ProviderPaymentStatus, RefundRequest, RefundResponse,
};
pub use queue::{JobHandler, JobOutcome, JobQueue, QueueError};
