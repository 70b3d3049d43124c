//! Two-tier idempotency engine.
//!
//! A record per (merchant, key) pair gates each logical request to
//! at-most-once execution. The cache tier is a mirror: a stale absence falls
//! through to `start_processing`, which re-checks under the advisory lock.
//! Fingerprints detect a different request reusing the same key.

mod canonical;

pub use canonical::canonical_json;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::IdempotencyConfig;
use crate::interfaces::Cache;
use crate::model::{IdempotencyRecord, IdempotencyStatus};
use crate::storage::{self, Database, StorageError};

/// Result type for idempotency operations.
pub type Result<T> = std::result::Result<T, IdempotencyError>;

/// Errors raised by the idempotency gate.
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    /// Same key, different request fingerprint.
    #[error("Idempotency key reused with a different request")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of a pre-execution check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No record: the caller may attempt to start processing.
    Miss,
    /// A record exists and is still processing.
    InFlight,
    /// A completed record: replay the stored bytes verbatim.
    Replay { body: String, status_code: i32 },
}

/// Outcome of `start_processing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// This caller inserted the record and owns the execution.
    Started,
    /// Another writer got there first with a matching fingerprint.
    AlreadyExists(CheckOutcome),
}

/// SHA-256 fingerprint of the canonical serialization of (body, path, method).
pub fn fingerprint(body: &Value, path: &str, method: &str) -> String {
    let composite = serde_json::json!({
        "body": body,
        "method": method,
        "path": path,
    });
    let canonical = canonical_json(&composite);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// The at-most-once gate.
pub struct IdempotencyEngine {
    db: Database,
    cache: Arc<dyn Cache>,
    config: IdempotencyConfig,
}

impl IdempotencyEngine {
    pub fn new(db: Database, cache: Arc<dyn Cache>, config: IdempotencyConfig) -> Self {
        Self { db, cache, config }
    }

    fn cache_key(key: &str, merchant_id: &str) -> String {
        format!("idempotency:{key}:{merchant_id}")
    }

    fn lock_key(key: &str, merchant_id: &str) -> String {
        format!("idempotency:{key}:{merchant_id}")
    }

    fn outcome_for(record: &IdempotencyRecord, fingerprint: &str) -> Result<CheckOutcome> {
        if record.fingerprint != fingerprint {
            return Err(IdempotencyError::Conflict);
        }
        match record.status {
            IdempotencyStatus::Processing => Ok(CheckOutcome::InFlight),
            IdempotencyStatus::Completed => Ok(CheckOutcome::Replay {
                body: record.response_body.clone().unwrap_or_default(),
                status_code: record.response_status.unwrap_or(200),
            }),
        }
    }

    /// Consult the cache, then persistence. Lock-free; a stale cache miss is
    /// resolved by the locked re-check in [`start_processing`].
    pub async fn check(
        &self,
        key: &str,
        merchant_id: &str,
        fingerprint: &str,
    ) -> Result<CheckOutcome> {
        let cache_key = Self::cache_key(key, merchant_id);

        match self.cache.get(&cache_key).await {
            Ok(Some(bytes)) => {
                if let Ok(record) = serde_json::from_slice::<IdempotencyRecord>(&bytes) {
                    if !record.is_expired(Utc::now()) {
                        return Self::outcome_for(&record, fingerprint);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Idempotency cache read failed, falling to storage"),
        }

        let record = storage::idempotency::find(self.db.pool(), key, merchant_id).await?;
        match record {
            Some(record) if !record.is_expired(Utc::now()) => {
                self.mirror_to_cache(&record).await;
                Self::outcome_for(&record, fingerprint)
            }
            _ => Ok(CheckOutcome::Miss),
        }
    }

    /// Claim the key for this execution under the advisory lock.
    ///
    /// A concurrent writer that won the race is not an error: the existing
    /// record is surfaced so the caller can replay or report in-flight. A
    /// fingerprint mismatch is a conflict.
    pub async fn start_processing(
        &self,
        key: &str,
        merchant_id: &str,
        fingerprint: &str,
        path: &str,
        method: &str,
    ) -> Result<StartOutcome> {
        let record = IdempotencyRecord {
            key: key.to_string(),
            merchant_id: merchant_id.to_string(),
            fingerprint: fingerprint.to_string(),
            request_path: path.to_string(),
            request_method: method.to_string(),
            status: IdempotencyStatus::Processing,
            response_body: None,
            response_status: None,
            created_at: Utc::now(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.config.ttl())
                    .unwrap_or_else(|_| chrono::Duration::hours(24)),
        };

        let lock_key = Self::lock_key(key, merchant_id);
        let fingerprint = fingerprint.to_string();
        let key = key.to_string();
        let merchant_id = merchant_id.to_string();
        let insert_record = record.clone();

        let outcome = self
            .db
            .with_advisory_lock::<_, IdempotencyError, _>(&lock_key, move |tx| {
                Box::pin(async move {
                    // Re-check under the lock: the lock-free check may have
                    // raced another writer.
                    let existing =
                        storage::idempotency::find(&mut **tx, &key, &merchant_id).await?;

                    match existing {
                        Some(existing) if !existing.is_expired(Utc::now()) => {
                            Ok(StartOutcome::AlreadyExists(Self::outcome_for(
                                &existing,
                                &fingerprint,
                            )?))
                        }
                        Some(_) => {
                            // Expired leftover: replace it.
                            storage::idempotency::delete(&mut **tx, &key, &merchant_id).await?;
                            storage::idempotency::insert(&mut **tx, &insert_record).await?;
                            Ok(StartOutcome::Started)
                        }
                        None => {
                            storage::idempotency::insert(&mut **tx, &insert_record).await?;
                            Ok(StartOutcome::Started)
                        }
                    }
                })
            })
            .await?;

        if outcome == StartOutcome::Started {
            self.mirror_to_cache(&record).await;
            debug!(key = %record.key, merchant = %record.merchant_id, "Idempotency key claimed");
        }

        Ok(outcome)
    }

    /// Record the final response and rewrite the cache entry, preserving the
    /// remaining TTL.
    pub async fn complete(
        &self,
        key: &str,
        merchant_id: &str,
        response_body: &str,
        status_code: i32,
    ) -> Result<()> {
        storage::idempotency::complete(self.db.pool(), key, merchant_id, response_body, status_code)
            .await?;

        if let Some(record) = storage::idempotency::find(self.db.pool(), key, merchant_id).await? {
            self.mirror_to_cache(&record).await;
        }

        Ok(())
    }

    /// Drop the record from both tiers so an aborted request can be retried.
    pub async fn remove(&self, key: &str, merchant_id: &str) -> Result<()> {
        storage::idempotency::delete(self.db.pool(), key, merchant_id).await?;

        let cache_key = Self::cache_key(key, merchant_id);
        if let Err(e) = self.cache.delete(&cache_key).await {
            warn!(error = %e, "Idempotency cache delete failed");
        }

        Ok(())
    }

    /// Delete expired persistence rows; returns how many went away.
    pub async fn collect_expired(&self) -> Result<u64> {
        Ok(storage::idempotency::delete_expired(self.db.pool()).await?)
    }

    /// Write the record to the cache tier with its remaining TTL.
    ///
    /// Cache failures are logged, never fatal: persistence is the source of
    /// truth.
    async fn mirror_to_cache(&self, record: &IdempotencyRecord) {
        let remaining = (record.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return;
        }

        let cache_key = Self::cache_key(&record.key, &record.merchant_id);
        match serde_json::to_vec(record) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&cache_key, &bytes, remaining).await {
                    warn!(error = %e, "Idempotency cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "Idempotency record serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_across_key_order() {
        let a = serde_json::json!({"amount": "100.00", "currency": "USD"});
        let b = serde_json::json!({"currency": "USD", "amount": "100.00"});
        assert_eq!(
            fingerprint(&a, "/api/v1/payments", "POST"),
            fingerprint(&b, "/api/v1/payments", "POST"),
        );
    }

    #[test]
    fn test_fingerprint_varies_with_body_path_method() {
        let body = serde_json::json!({"amount": "100.00"});
        let base = fingerprint(&body, "/api/v1/payments", "POST");

        let other_body = serde_json::json!({"amount": "200.00"});
        assert_ne!(base, fingerprint(&other_body, "/api/v1/payments", "POST"));
        assert_ne!(base, fingerprint(&body, "/api/v1/refunds", "POST"));
        assert_ne!(base, fingerprint(&body, "/api/v1/payments", "PUT"));
    }

    #[test]
    fn test_outcome_for_detects_conflict() {
        let record = IdempotencyRecord {
            key: "k".into(),
            merchant_id: "m".into(),
            fingerprint: "fp-a".into(),
            request_path: "/api/v1/payments".into(),
            request_method: "POST".into(),
            status: IdempotencyStatus::Processing,
            response_body: None,
            response_status: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        };

        assert!(matches!(
            IdempotencyEngine::outcome_for(&record, "fp-b"),
            Err(IdempotencyError::Conflict)
        ));
        assert_eq!(
            IdempotencyEngine::outcome_for(&record, "fp-a").unwrap(),
            CheckOutcome::InFlight
        );
    }

    #[test]
    fn test_outcome_for_replays_completed() {
        let record = IdempotencyRecord {
            key: "k".into(),
            merchant_id: "m".into(),
            fingerprint: "fp".into(),
            request_path: "/api/v1/payments".into(),
            request_method: "POST".into(),
            status: IdempotencyStatus::Completed,
            response_body: Some("{\"id\":\"x\"}".into()),
            response_status: Some(201),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        };

        assert_eq!(
            IdempotencyEngine::outcome_for(&record, "fp").unwrap(),
            CheckOutcome::Replay {
                body: "{\"id\":\"x\"}".into(),
                status_code: 201
            }
        );
    }
}
