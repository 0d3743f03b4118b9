//! In-Memory Mock Store
//!
//! DashMap-backed stand-in for the document store, used when the adapter runs
//! with `flags.isMock`. Expiry values are interpreted exactly like the real
//! store: 0 never expires, values up to 30 days are relative seconds, larger
//! values are absolute Unix timestamps in seconds. Expired documents are
//! dropped lazily on access.

use crate::store::{
    Bucket, BucketEvent, BucketListener, ConnectionSpec, Connector, Document, StoreError,
    StoreResult, UpsertOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Largest expiry the store treats as a relative offset (30 days in seconds)
const RELATIVE_EXPIRY_LIMIT_SECS: u64 = 30 * 24 * 60 * 60;

// =============================================================================
// Stored Document
// =============================================================================

#[derive(Debug, Clone)]
struct StoredDocument {
    value: String,
    /// Expiry exactly as received from the client
    expiry: u64,
    /// Resolved expiry instant (Unix millis), None = never
    expires_at_ms: Option<i64>,
}

impl StoredDocument {
    fn new(value: String, expiry: u64, now_ms: i64) -> Self {
        let expires_at_ms = match expiry {
            0 => None,
            secs if secs <= RELATIVE_EXPIRY_LIMIT_SECS => Some(now_ms + (secs as i64) * 1000),
            absolute => Some(i64::try_from(absolute).unwrap_or(i64::MAX).saturating_mul(1000)),
        };

        Self {
            value,
            expiry,
            expires_at_ms,
        }
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at_ms, Some(at) if at <= now_ms)
    }
}

type BucketData = Arc<DashMap<String, StoredDocument>>;

// =============================================================================
// Memory Cluster
// =============================================================================

struct ClusterState {
    buckets: DashMap<String, BucketData>,
    online: AtomicBool,
}

/// In-process mock cluster
///
/// Cloning shares the underlying data, so buckets opened from clones (or
/// re-opened after a stop) see the same documents.
#[derive(Clone)]
pub struct MemoryCluster {
    state: Arc<ClusterState>,
}

impl MemoryCluster {
    /// Create an empty, online cluster
    pub fn new() -> Self {
        Self {
            state: Arc::new(ClusterState {
                buckets: DashMap::new(),
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate the cluster going offline or coming back
    pub fn set_online(&self, online: bool) {
        self.state.online.store(online, Ordering::Release);
    }

    /// Whether the cluster is reachable
    pub fn is_online(&self) -> bool {
        self.state.online.load(Ordering::Acquire)
    }

    /// Number of live documents in a bucket
    pub fn document_count(&self, bucket: &str) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        self.state
            .buckets
            .get(bucket)
            .map(|data| data.iter().filter(|doc| !doc.is_expired(now_ms)).count())
            .unwrap_or(0)
    }

    /// Expiry value a document was written with
    pub fn raw_expiry(&self, bucket: &str, key: &str) -> Option<u64> {
        self.state
            .buckets
            .get(bucket)
            .and_then(|data| data.get(key).map(|doc| doc.expiry))
    }

    fn bucket_data(&self, name: &str) -> BucketData {
        self.state
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryCluster {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open_bucket(
        &self,
        spec: &ConnectionSpec,
        listener: BucketListener,
    ) -> StoreResult<Arc<dyn Bucket>> {
        let bucket = MemoryBucket {
            name: spec.bucket.clone(),
            data: self.bucket_data(&spec.bucket),
            cluster: self.clone(),
            closed: AtomicBool::new(false),
        };

        if self.is_online() {
            listener(BucketEvent::Connected {
                endpoint: format!("mock/{}", spec.bucket),
            });
        } else {
            listener(BucketEvent::Error(StoreError::network(
                "failed to connect to bucket",
            )));
        }

        debug!(bucket = %spec.bucket, "Opened mock bucket");
        Ok(Arc::new(bucket))
    }
}

// =============================================================================
// Memory Bucket
// =============================================================================

/// Bucket handle on a [`MemoryCluster`]
pub struct MemoryBucket {
    name: String,
    data: BucketData,
    cluster: MemoryCluster,
    closed: AtomicBool,
}

impl MemoryBucket {
    fn ensure_connected(&self) -> StoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::network("generic network failure"))
        }
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.cluster.is_online()
    }

    async fn get(&self, key: &str) -> StoreResult<Document> {
        self.ensure_connected()?;

        let now_ms = Utc::now().timestamp_millis();
        let value = match self.data.get(key) {
            Some(doc) if !doc.is_expired(now_ms) => Some(doc.value.clone()),
            Some(_) => None,
            None => return Err(StoreError::key_not_found(key)),
        };

        match value {
            Some(value) => Ok(Document { value }),
            None => {
                self.data.remove(key);
                Err(StoreError::key_not_found(key))
            }
        }
    }

    async fn upsert(&self, key: &str, value: String, options: UpsertOptions) -> StoreResult<()> {
        self.ensure_connected()?;

        let now_ms = Utc::now().timestamp_millis();
        self.data.retain(|_, doc| !doc.is_expired(now_ms));
        self.data.insert(
            key.to_string(),
            StoredDocument::new(value, options.expiry, now_ms),
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.ensure_connected()?;

        let now_ms = Utc::now().timestamp_millis();
        match self.data.remove(key) {
            Some((_, doc)) if !doc.is_expired(now_ms) => Ok(()),
            _ => Err(StoreError::key_not_found(key)),
        }
    }

    fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// =============================================================================
// Tests
// =============================================================================
