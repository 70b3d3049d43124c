//! Payrail service binary.
//!
//! Wires configuration, storage, cache, queue, providers, services, the
//! background worker, and the HTTP server, then runs until a shutdown
//! signal arrives (SIGINT/SIGTERM or the storage health monitor).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payrail::api::{create_router, AppState};
use payrail::breaker::BreakerRegistry;
use payrail::cache::RedisCache;
use payrail::config::{Config, LOG_ENV_VAR};
use payrail::idempotency::IdempotencyEngine;
use payrail::interfaces::Cache;
use payrail::providers::ProviderRegistry;
use payrail::queue::AmqpJobQueue;
use payrail::services::webhooks::HttpWebhookTransport;
use payrail::services::{PaymentService, RefundService, WebhookDeliveryService};
use payrail::storage::{self, Database};
use payrail::worker::Worker;

/// Initialize tracing from the `PAYRAIL_LOG` environment variable.
///
/// Defaults to "info" level if the variable is not set.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve once any shutdown trigger fires.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
        _ = shutdown.changed() => info!("Internal shutdown requested"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Arc::new(Config::load()?);
    info!(
        environment = ?config.server.environment,
        port = config.server.port,
        "Starting payrail"
    );

    let db = Database::connect(&config.postgres).await?;
    let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(&config.redis).await?);
    let queue = Arc::new(AmqpJobQueue::connect(config.amqp.clone()).await?);

    let providers = Arc::new(ProviderRegistry::with_defaults(&config.webhooks.secret));
    let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
    info!(providers = ?providers.names(), "Provider registry ready");

    let transport = Arc::new(HttpWebhookTransport::new(Duration::from_secs(
        config.webhooks.request_timeout_secs,
    ))?);
    let webhooks = Arc::new(WebhookDeliveryService::new(
        db.clone(),
        queue.clone(),
        transport,
        config.webhooks.clone(),
    ));
    let idempotency = Arc::new(IdempotencyEngine::new(
        db.clone(),
        cache.clone(),
        config.idempotency.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        db.clone(),
        providers.clone(),
        breakers.clone(),
        webhooks.clone(),
    ));
    let refunds = Arc::new(RefundService::new(
        db.clone(),
        providers.clone(),
        breakers.clone(),
        webhooks.clone(),
    ));

    // Shutdown fans out to the worker tickers and the HTTP drain. The
    // storage health monitor escalates a connection-failure burst here too.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(storage::run_health_monitor(db.clone(), shutdown_tx.clone()));

    let worker = Worker::new(
        queue.clone(),
        webhooks.clone(),
        idempotency.clone(),
        Duration::from_secs(config.webhooks.sweep_interval_secs),
        Duration::from_secs(config.idempotency.gc_interval_secs),
    );
    worker.start(shutdown_rx.clone()).await?;

    let state = AppState {
        config: config.clone(),
        db,
        cache,
        providers,
        breakers,
        payments,
        refunds,
        webhooks,
        idempotency,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    // Propagate external signals into the shared shutdown channel so every
    // component drains from the same trigger.
    let server_shutdown = {
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move {
            wait_for_shutdown(shutdown_rx).await;
            let _ = shutdown_tx.send(true);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(server_shutdown);

    // Bound the drain: after the shutdown trigger, in-flight requests get
    // the configured grace period before the process gives up on them.
    let drain_deadline = {
        let mut shutdown_rx = shutdown_rx.clone();
        let grace = Duration::from_secs(config.server.shutdown_grace_secs);
        async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    // No sender left; nothing will ever trigger the drain.
                    std::future::pending::<()>().await;
                }
            }
            tokio::time::sleep(grace).await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => {
            warn!("Drain deadline reached, abandoning in-flight requests");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
