//! Domain Ports - The cache engine contract
//!
//! The caching front-end drives every backend through this trait. Adapters
//! implement it on top of a concrete store.

use crate::cache::envelope::Envelope;
use crate::cache::key::CacheKey;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

// =============================================================================
// Cache Engine
// =============================================================================

/// Contract between the caching front-end and a storage backend
///
/// Lifecycle calls (`start`/`stop`) are expected to be serialized by the
/// caller. Data operations may run concurrently once the engine is ready.
#[async_trait]
pub trait CacheEngine: Send + Sync {
    /// Connect to the backend; succeeds immediately if already ready
    async fn start(&self) -> Result<()>;

    /// Release the backend connection; no-op if not ready
    fn stop(&self);

    /// Whether data operations may be issued
    fn is_ready(&self) -> bool;

    /// Check that a segment name can be used with this engine
    fn validate_segment_name(&self, name: &str) -> Result<()>;

    /// Fetch an entry
    ///
    /// `Ok(None)` is a miss. On a hit the whole envelope is returned so the
    /// caller can judge freshness from `stored` and `ttl`.
    async fn get(&self, key: &CacheKey) -> Result<Option<Envelope>>;

    /// Store `value` under `key` for `ttl_ms` milliseconds
    async fn set<T>(&self, key: &CacheKey, value: &T, ttl_ms: i64) -> Result<()>
    where
        T: Serialize + Send + Sync + ?Sized;

    /// Remove an entry; removing a missing entry succeeds
    async fn drop(&self, key: &CacheKey) -> Result<()>;
}
