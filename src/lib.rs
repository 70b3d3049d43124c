//! Payrail - payment orchestration service
//!
//! Accepts charge and refund requests over HTTP, routes them to external
//! payment processors, executes each client request at most once, records an
//! immutable state history, and notifies merchants through signed webhooks.

pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod idempotency;
pub mod interfaces;
pub mod model;
pub mod money;
pub mod providers;
pub mod queue;
pub mod saga;
pub mod services;
pub mod storage;
pub mod worker;

// Re-export common types for library usage
pub use config::Config;
pub use interfaces::{Cache, JobQueue, PaymentProvider};
pub use model::{Payment, PaymentStatus, Refund, RefundStatus, WebhookEvent, WebhookStatus};
pub use money::{Currency, Money};
