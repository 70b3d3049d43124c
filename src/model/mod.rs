//! Domain types.
//!
//! Payments are the aggregate root; transactions, refunds, and webhook
//! events live under a payment. Idempotency records are standalone but
//! scoped by merchant. Audit logs reference any entity.

pub mod api_key;
pub mod audit;
pub mod idempotency;
pub mod payment;
pub mod refund;
pub mod webhook;

pub use api_key::ApiKey;
pub use audit::{AuditActorType, AuditEntry};
pub use idempotency::{IdempotencyRecord, IdempotencyStatus};
pub use payment::{Payment, PaymentStatus, Transaction};
pub use refund::{Refund, RefundStatus};
pub use webhook::{WebhookEvent, WebhookStatus};
