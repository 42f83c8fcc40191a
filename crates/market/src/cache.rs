//! Key-value cache boundary for in-progress carts.
//!
//! The cart store only needs single-key get/set/delete of opaque bytes - no
//! transactions, no cross-key guarantees. [`MokaCartCache`] is the in-process
//! implementation (cache-wide TTL, bounded capacity); a Redis-shaped
//! implementation would slot in behind the same trait.

use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;

/// Errors from the cache backend.
///
/// The in-process backend is infallible, but the trait keeps the `Result`
/// shape so a networked backend can report failures.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend refused or failed the operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Byte-oriented key-value cache.
#[allow(async_fn_in_trait)]
pub trait CartCache: Clone + Send + Sync {
    /// Fetch the value for `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    /// Remove `key`. Removing a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cart cache backed by `moka`.
#[derive(Clone)]
pub struct MokaCartCache {
    cache: Cache<String, Vec<u8>>,
}

impl MokaCartCache {
    /// Create a cache holding at most `max_capacity` carts, each expiring
    /// `ttl` after its last write.
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

impl CartCache for MokaCartCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.cache.insert(key.to_owned(), value).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
