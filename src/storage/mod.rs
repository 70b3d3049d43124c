//! PostgreSQL persistence adapter.
//!
//! The [`Database`] wrapper owns the bounded connection pool and exposes
//! transactional scopes, advisory-locked scopes keyed by opaque strings, and
//! a health monitor that escalates a burst of connection failures into a
//! graceful-shutdown signal. Repository modules hold the per-aggregate SQL.

pub mod api_keys;
pub mod audit;
pub mod idempotency;
pub mod payments;
pub mod refunds;
pub mod schema;
pub mod webhooks;

use std::time::Duration;

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::PostgresConfig;

/// Consecutive connection failures that trigger a graceful shutdown.
const SHUTDOWN_FAILURE_BURST: u32 = 5;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Shared handle to the PostgreSQL pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with a bounded pool and run pending migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.uri)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(pool_size = config.pool_size, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` inside a transaction: commit on success, roll back on error.
    pub async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StorageError> + Send,
        F: for<'c> FnOnce(
                &'c mut Transaction<'static, Postgres>,
            ) -> BoxFuture<'c, std::result::Result<T, E>>
            + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| E::from(StorageError::Sqlx(e)))?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| E::from(StorageError::Sqlx(e)))?;
                Ok(value)
            }
            Err(e) => {
                // Rollback failure is secondary; the primary error wins.
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Run `f` inside a transaction holding the advisory lock for `key`.
    ///
    /// The lock is transaction-scoped (`pg_advisory_xact_lock`) and released
    /// on commit or rollback, so it serializes the scope across replicas.
    pub async fn with_advisory_lock<T, E, F>(&self, key: &str, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StorageError> + Send,
        F: for<'c> FnOnce(
                &'c mut Transaction<'static, Postgres>,
            ) -> BoxFuture<'c, std::result::Result<T, E>>
            + Send
            + 'static,
    {
        let lock_id = advisory_lock_id(key);
        self.transaction(move |tx| {
            Box::pin(async move {
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(lock_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| E::from(StorageError::Sqlx(e)))?;
                f(tx).await
            })
        })
        .await
    }

    /// Cheap liveness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Hash an opaque string key to a 63-bit advisory lock id.
///
/// First eight bytes of SHA-256, masked non-negative so the id fits the
/// signed bigint `pg_advisory_xact_lock` expects.
pub fn advisory_lock_id(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (i64::from_be_bytes(bytes)) & i64::MAX
}

/// Monitor connectivity; a burst of consecutive failures signals shutdown.
///
/// Runs until the shutdown channel closes. The signal is advisory: the
/// bootstrap decides how to drain.
pub async fn run_health_monitor(db: Database, shutdown: watch::Sender<bool>) {
    let mut consecutive_failures = 0u32;
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match db.health_check().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    info!("Database connectivity restored");
                }
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    error = %e,
                    consecutive_failures,
                    "Database health check failed"
                );
                if consecutive_failures >= SHUTDOWN_FAILURE_BURST {
                    error!("Database unreachable, requesting graceful shutdown");
                    let _ = shutdown.send(true);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_lock_id_is_non_negative() {
        for key in ["idempotency:a:m1", "idempotency:b:m2", "", "x"] {
            assert!(advisory_lock_id(key) >= 0);
        }
    }

    #[test]
    fn test_advisory_lock_id_is_stable_and_distinct() {
        let a = advisory_lock_id("idempotency:k1:m");
        let b = advisory_lock_id("idempotency:k2:m");
        assert_eq!(a, advisory_lock_id("idempotency:k1:m"));
        assert_ne!(a, b);
    }
}
