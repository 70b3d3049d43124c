//! AMQP (RabbitMQ) job queue implementation.
//!
//! Uses a durable queue with persistent messages. Delayed publishes run on
//! an in-process timer before the actual publish; handlers must be
//! idempotent since a crash inside that window can produce duplicates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::AmqpConfig;
use crate::interfaces::queue::{JobHandler, JobOutcome, JobQueue, QueueError, Result};

/// Delivery mode 2: persisted to disk by the broker.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// AMQP-backed [`JobQueue`].
pub struct AmqpJobQueue {
    pool: Pool,
    config: AmqpConfig,
    handlers: Arc<RwLock<Vec<Box<dyn JobHandler>>>>,
}

impl AmqpJobQueue {
    /// Connect and declare the durable queue.
    pub async fn connect(config: AmqpConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(4)
            .build()
            .map_err(|e| QueueError::Connection(format!("Failed to build pool: {e}")))?;

        let queue = Self {
            pool,
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
        };

        // Fail fast on an unreachable broker and declare the queue once.
        let channel = queue.get_channel().await?;
        queue.declare_queue(&channel).await?;

        info!(queue = %queue.config.webhook_queue, "Connected to AMQP");

        Ok(queue)
    }

    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            QueueError::Connection(format!("Failed to get connection from pool: {e}"))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to create channel: {e}")))
    }

    async fn declare_queue(&self, channel: &Channel) -> Result<()> {
        channel
            .queue_declare(
                &self.config.webhook_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to declare queue: {e}")))?;

        Ok(())
    }

    async fn publish_now(&self, payload: &[u8]) -> Result<()> {
        let channel = self.get_channel().await?;

        channel
            .basic_publish(
                "",
                &self.config.webhook_queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        debug!(queue = %self.config.webhook_queue, "Published job");
        Ok(())
    }

    /// Consumer loop with automatic reconnection and exponential backoff
    /// with jitter.
    async fn consume_with_reconnect(
        pool: Pool,
        config: AmqpConfig,
        handlers: Arc<RwLock<Vec<Box<dyn JobHandler>>>>,
    ) {
        use futures::StreamExt;

        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();

        let mut backoff_iter = backoff_builder.build();

        loop {
            match Self::setup_consumer(&pool, &config).await {
                Ok(mut consumer) => {
                    info!(queue = %config.webhook_queue, "Consumer connected, processing messages");
                    backoff_iter = backoff_builder.build();

                    while let Some(delivery) = consumer.next().await {
                        match delivery {
                            Ok(delivery) => {
                                Self::process_delivery(delivery, &handlers).await;
                            }
                            Err(e) => {
                                error!(error = %e, "Consumer delivery error, will reconnect");
                                break;
                            }
                        }
                    }

                    info!(queue = %config.webhook_queue, "Consumer stream ended, reconnecting...");
                }
                Err(e) => {
                    let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
                    error!(
                        error = %e,
                        backoff_ms = %delay.as_millis(),
                        queue = %config.webhook_queue,
                        "Failed to set up consumer, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    async fn setup_consumer(pool: &Pool, config: &AmqpConfig) -> Result<lapin::Consumer> {
        let conn = pool.get().await.map_err(|e: PoolError| {
            QueueError::Connection(format!("Failed to get connection from pool: {e}"))
        })?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to create channel: {e}")))?;

        channel
            .queue_declare(
                &config.webhook_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Subscribe(format!("Failed to declare queue: {e}")))?;

        // One unacked message at a time; retry pacing lives in persistence.
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Subscribe(format!("Failed to set prefetch: {e}")))?;

        let consumer = channel
            .basic_consume(
                &config.webhook_queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Subscribe(format!("Failed to start consumer: {e}")))?;

        Ok(consumer)
    }

    async fn process_delivery(
        delivery: lapin::message::Delivery,
        handlers: &Arc<RwLock<Vec<Box<dyn JobHandler>>>>,
    ) {
        let payload = delivery.data.clone();

        let outcome = {
            let handlers_guard = handlers.read().await;
            match handlers_guard.first() {
                Some(handler) => handler.handle(payload).await,
                None => {
                    warn!("Delivery received before any handler subscribed");
                    JobOutcome::Retry
                }
            }
        };

        let result = match outcome {
            JobOutcome::Ack => delivery.ack(BasicAckOptions::default()).await,
            JobOutcome::Discard => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
            JobOutcome::Retry => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
        };

        if let Err(e) = result {
            error!(error = %e, "Failed to settle delivery");
        }
    }
}

#[async_trait]
impl JobQueue for AmqpJobQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        self.publish_now(&payload).await
    }

    async fn publish_delayed(&self, payload: Vec<u8>, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return self.publish_now(&payload).await;
        }

        // In-process timer in place of a broker delayed exchange. The row in
        // webhook_events remains the source of truth: if this task is lost,
        // the sweeper republishes the job.
        let pool = self.pool.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let queue = AmqpJobQueue {
                pool,
                config,
                handlers: Arc::new(RwLock::new(Vec::new())),
            };
            if let Err(e) = queue.publish_now(&payload).await {
                warn!(error = %e, "Delayed publish failed; sweeper will recover the job");
            }
        });

        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn JobHandler>) -> Result<()> {
        {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
        }

        let pool = self.pool.clone();
        let config = self.config.clone();
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            Self::consume_with_reconnect(pool, config, handlers).await;
        });

        Ok(())
    }
}
