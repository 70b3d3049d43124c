//! Background worker: queue consumer and periodic sweepers.
//!
//! One consumer pulls webhook jobs with prefetch 1 and manual ack. Send
//! outcomes map onto queue settlement: done or permanently unusable jobs
//! ack, transport failures nack without requeue (the persisted schedule
//! owns the retry), unexpected errors nack with requeue. Tickers drive the
//! webhook retry sweep and idempotency garbage collection.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::idempotency::IdempotencyEngine;
use crate::interfaces::queue::{JobHandler, JobOutcome, JobQueue, QueueError};
use crate::services::webhooks::{SendOutcome, WebhookDeliveryService, WebhookJob};

/// Queue handler delegating to the webhook sender.
pub struct DeliveryHandler {
    sender: Arc<WebhookDeliveryService>,
}

impl DeliveryHandler {
    pub fn new(sender: Arc<WebhookDeliveryService>) -> Self {
        Self { sender }
    }
}

impl JobHandler for DeliveryHandler {
    fn handle(&self, payload: Vec<u8>) -> BoxFuture<'static, JobOutcome> {
        let sender = self.sender.clone();

        Box::pin(async move {
            let job: WebhookJob = match serde_json::from_slice(&payload) {
                Ok(job) => job,
                Err(e) => {
                    // Malformed messages can never succeed; drop them.
                    warn!(error = %e, "Discarding malformed webhook job");
                    return JobOutcome::Discard;
                }
            };

            match sender.send(job.webhook_id).await {
                Ok(SendOutcome::Delivered)
                | Ok(SendOutcome::AlreadySent)
                | Ok(SendOutcome::Missing)
                | Ok(SendOutcome::Exhausted) => JobOutcome::Ack,
                Ok(SendOutcome::RetryScheduled) | Ok(SendOutcome::PermanentlyFailed) => {
                    // The delivery failed but persistence already holds the
                    // schedule; requeueing here would double-send.
                    JobOutcome::Discard
                }
                Err(e) => {
                    error!(webhook_id = %job.webhook_id, error = %e, "Webhook job errored");
                    JobOutcome::Retry
                }
            }
        })
    }
}

/// Consumer plus sweepers, bounded by a shutdown signal.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    sender: Arc<WebhookDeliveryService>,
    idempotency: Arc<IdempotencyEngine>,
    sweep_interval: Duration,
    gc_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        sender: Arc<WebhookDeliveryService>,
        idempotency: Arc<IdempotencyEngine>,
        sweep_interval: Duration,
        gc_interval: Duration,
    ) -> Self {
        Self {
            queue,
            sender,
            idempotency,
            sweep_interval,
            gc_interval,
        }
    }

    /// Subscribe the consumer and spawn the periodic sweepers.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        self.queue
            .subscribe(Box::new(DeliveryHandler::new(self.sender.clone())))
            .await?;

        info!("Webhook consumer subscribed");

        tokio::spawn(run_webhook_sweeper(
            self.sender.clone(),
            self.sweep_interval,
            shutdown.clone(),
        ));
        tokio::spawn(run_idempotency_gc(
            self.idempotency.clone(),
            self.gc_interval,
            shutdown,
        ));

        Ok(())
    }
}

/// Republish due webhook retries until shutdown.
async fn run_webhook_sweeper(
    sender: Arc<WebhookDeliveryService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sender.sweep_due().await {
                    Ok(count) if count > 0 => debug!(count, "Webhook sweep republished jobs"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Webhook sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("Webhook sweeper stopping");
                return;
            }
        }
    }
}

/// Delete expired idempotency rows until shutdown.
async fn run_idempotency_gc(
    engine: Arc<IdempotencyEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.collect_expired().await {
                    Ok(count) if count > 0 => debug!(count, "Expired idempotency rows removed"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Idempotency GC failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("Idempotency GC stopping");
                return;
            }
        }
    }
}
