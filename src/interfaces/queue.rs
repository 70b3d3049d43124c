//! Durable job queue interface.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// What the consumer should do with a delivery after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Acknowledge: the job is done (or permanently unusable).
    Ack,
    /// Negative-ack without requeue: a durable retry schedule owns the job.
    Discard,
    /// Negative-ack with requeue: transient consumer-side trouble.
    Retry,
}

/// Handler for consuming jobs from the queue.
pub trait JobHandler: Send + Sync {
    /// Process one delivery payload.
    fn handle(&self, payload: Vec<u8>) -> BoxFuture<'static, JobOutcome>;
}

/// Durable queue with delayed publish and manual-acknowledge consume.
///
/// Implementations: `AmqpJobQueue` (production), `MemoryJobQueue` (tests).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a persistent message.
    async fn publish(&self, payload: Vec<u8>) -> Result<()>;

    /// Publish a persistent message after a delay.
    ///
    /// Without broker-side delay support the delay runs on an in-process
    /// timer; consumers must tolerate the duplicate deliveries that can
    /// result from a crash between timer expiry and publish confirmation.
    async fn publish_delayed(&self, payload: Vec<u8>, delay: Duration) -> Result<()>;

    /// Start consuming with prefetch 1 and manual acknowledgement.
    ///
    /// The handler's [`JobOutcome`] is mapped to ack / nack-without-requeue /
    /// nack-with-requeue.
    async fn subscribe(&self, handler: Box<dyn JobHandler>) -> Result<()>;
}
