//! Business services: charge orchestration, refunds, webhook delivery.

pub mod payments;
pub mod refunds;
pub mod webhooks;

pub use payments::{ChargeResult, CreatePayment, PaymentError, PaymentService, ReconcileOutcome};
pub use refunds::{RefundError, RefundResult, RefundService, RefundableSummary};
pub use webhooks::{SendOutcome, WebhookDeliveryService, WebhookError};
