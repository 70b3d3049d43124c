//! In-memory job queue for tests.
//!
//! Deliveries run on a background task per subscription. `Retry` outcomes
//! are redelivered; `Discard` and `Ack` settle the message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::interfaces::queue::{JobHandler, JobOutcome, JobQueue, Result};

/// Channel-backed [`JobQueue`] double.
pub struct MemoryJobQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    published: Arc<RwLock<Vec<Vec<u8>>>>,
    delayed: Arc<RwLock<Vec<(Vec<u8>, Duration)>>>,
    deliver_delayed_immediately: bool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            published: Arc::new(RwLock::new(Vec::new())),
            delayed: Arc::new(RwLock::new(Vec::new())),
            deliver_delayed_immediately: false,
        }
    }

    /// Treat delayed publishes as immediate, so retry paths run without
    /// waiting out the schedule.
    pub fn with_immediate_delays() -> Self {
        Self {
            deliver_delayed_immediately: true,
            ..Self::new()
        }
    }

    /// Everything published so far (including delayed ones once fired).
    pub async fn published(&self) -> Vec<Vec<u8>> {
        self.published.read().await.clone()
    }

    /// Delayed publishes with their requested delays.
    pub async fn delayed(&self) -> Vec<(Vec<u8>, Duration)> {
        self.delayed.read().await.clone()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        self.published.write().await.push(payload.clone());
        let _ = self.tx.send(payload);
        Ok(())
    }

    async fn publish_delayed(&self, payload: Vec<u8>, delay: Duration) -> Result<()> {
        self.delayed.write().await.push((payload.clone(), delay));
        if self.deliver_delayed_immediately {
            self.publish(payload).await?;
        }
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn JobHandler>) -> Result<()> {
        let rx = self.rx.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            loop {
                let payload = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(payload) = payload else { break };

                match handler.handle(payload.clone()).await {
                    JobOutcome::Ack | JobOutcome::Discard => {}
                    JobOutcome::Retry => {
                        let _ = tx.send(payload);
                    }
                }
            }
        });

        Ok(())
    }
}
