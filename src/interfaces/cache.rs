//! Key-value cache interface.

use std::time::Duration;

use async_trait::async_trait;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            CacheError::Connection(e.to_string())
        } else {
            CacheError::Backend(e.to_string())
        }
    }
}

/// Byte-value cache with per-key TTLs.
///
/// The cache is a mirror tier: callers must tolerate absence and fall back
/// to persistence. Implementations: `RedisCache` (production), `MemoryCache`
/// (tests).
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with a TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove a key; removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remaining TTL for a key; `None` when absent or without expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;
}
