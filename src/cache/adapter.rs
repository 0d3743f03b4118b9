//! Couchbase Cache Adapter
//!
//! Implements [`CacheEngine`] on top of a document-store bucket.
//!
//! ```text
//!   CacheKey ──► build_key ──► backend key ─┐
//!   value ─────► envelope::encode ──────────┼──► Bucket::upsert(expiry)
//!   ttl ───────► to_backend_expiry ─────────┘
//! ```
//!
//! Lifecycle: `Disconnected -> Connecting -> Ready -> Disconnected`. Data
//! operations require `Ready`. Input is validated before the readiness check
//! and before any network call.
//!
//! Backend failures are triaged by [`classify_error`]: not-found is a miss or
//! a no-op, connection failures are swallowed when
//! `flags.bypassCacheOnConnError` is set, everything else is returned.

use crate::cache::envelope::{self, Envelope};
use crate::cache::events::{AdapterEvent, EventHub, EventKind};
use crate::cache::expiry::to_backend_expiry;
use crate::cache::key::{self, CacheKey};
use crate::cache::metrics::{AdapterMetrics, AdapterStatsSnapshot};
use crate::cache::triage::{classify_error, ErrorClass};
use crate::config::AdapterOptions;
use crate::domain::ports::CacheEngine;
use crate::error::{Error, Result};
use crate::store::{
    Bucket, BucketEvent, BucketListener, Connector, MemoryCluster, RestConnector, StoreError,
    UpsertOptions,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Connection State
// =============================================================================

enum ConnectionState {
    Disconnected,
    Connecting,
    Ready(Arc<dyn Bucket>),
}

impl ConnectionState {
    fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready(_) => "ready",
        }
    }
}

// =============================================================================
// Couchbase Cache
// =============================================================================

/// Cache engine backed by a document-store bucket
pub struct CouchbaseCache {
    options: AdapterOptions,
    connector: Arc<dyn Connector>,
    state: RwLock<ConnectionState>,
    events: EventHub,
    metrics: AdapterMetrics,
}

impl CouchbaseCache {
    /// Create an adapter, picking the store client from the options
    ///
    /// `flags.isMock` selects a fresh in-process [`MemoryCluster`]; otherwise
    /// the REST client is used.
    pub fn new(options: AdapterOptions) -> Self {
        let connector: Arc<dyn Connector> = if options.flags.is_mock {
            Arc::new(MemoryCluster::new())
        } else {
            Arc::new(RestConnector::new())
        };
        Self::with_connector(options, connector)
    }

    /// Create an adapter on an explicit store client
    pub fn with_connector(options: AdapterOptions, connector: Arc<dyn Connector>) -> Self {
        let events = EventHub::new(options.flags.debug_events());
        Self {
            options,
            connector,
            state: RwLock::new(ConnectionState::Disconnected),
            events,
            metrics: AdapterMetrics::new(),
        }
    }

    /// Options the adapter was built with
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Subscribe to adapter events
    pub fn on<F>(&self, kind: EventKind, observer: F)
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, observer);
    }

    /// Operation counters
    pub fn stats(&self) -> AdapterStatsSnapshot {
        self.metrics.snapshot()
    }

    /// Backend key for `key` under this adapter's partition
    pub fn backend_key(&self, key: &CacheKey) -> String {
        key::build_key(self.options.partition(), key)
    }

    fn bypass_on_conn_error(&self) -> bool {
        self.options.flags.bypass_cache_on_conn_error
    }

    fn endpoint_label(&self) -> String {
        format!(
            "{}/pools/default/buckets/{}",
            self.options.locations().join(","),
            self.options.bucket_name()
        )
    }

    fn bucket(&self) -> Result<Arc<dyn Bucket>> {
        match &*self.state.read() {
            ConnectionState::Ready(bucket) => Ok(bucket.clone()),
            _ => Err(Error::NotReady),
        }
    }

    fn listener(&self) -> BucketListener {
        let events = self.events.clone();
        let bucket = self.options.bucket_name().to_string();
        Arc::new(move |event: BucketEvent| match event {
            BucketEvent::Connected { endpoint } => {
                debug!(endpoint = %endpoint, bucket = %bucket, "Bucket connected");
                events.emit(AdapterEvent::Connect(format!(
                    "connected to {} bucket",
                    bucket
                )));
            }
            BucketEvent::Error(err) => {
                warn!(bucket = %bucket, error = %err, "Bucket error");
                events.emit(AdapterEvent::error(err));
            }
        })
    }

    /// Whether the operation should be skipped because the store is unreachable
    fn should_bypass(&self, bucket: &dyn Bucket, op: &'static str, backend_key: &str) -> bool {
        if self.bypass_on_conn_error() && !bucket.is_connected() {
            warn!(op, key = %backend_key, "Store not connected, bypassing cache");
            self.metrics.record_bypass();
            true
        } else {
            false
        }
    }

    /// Apply the triage rules to a backend failure
    ///
    /// `Ok(())` means the failure is absorbed and the operation degrades to a
    /// miss or a no-op.
    fn absorb(&self, err: StoreError, op: &'static str, backend_key: &str) -> Result<()> {
        match classify_error(&err) {
            ErrorClass::NotFound => Ok(()),
            ErrorClass::Connection if self.bypass_on_conn_error() => {
                warn!(op, key = %backend_key, error = %err, "Connection failure, bypassing cache");
                self.metrics.record_bypass();
                Ok(())
            }
            _ => Err(self.fail(op, Error::Backend(err))),
        }
    }

    fn fail(&self, op: &'static str, err: Error) -> Error {
        error!(op, error = %err, "Cache operation failed");
        self.metrics.record_error();
        self.events.emit(AdapterEvent::error(&err));
        err
    }
}

#[async_trait]
impl CacheEngine for CouchbaseCache {
    async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Ready(_) => return Ok(()),
                ConnectionState::Connecting => return Err(Error::NotReady),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        let spec = self.options.connection_spec();
        match self.connector.open_bucket(&spec, self.listener()).await {
            Ok(bucket) => {
                *self.state.write() = ConnectionState::Ready(bucket);
                let label = self.endpoint_label();
                info!(connector = self.connector.name(), endpoint = %label, "Cache adapter started");
                self.events
                    .emit(AdapterEvent::Start(format!("started for {}", label)));
                Ok(())
            }
            Err(err) => {
                *self.state.write() = ConnectionState::Disconnected;
                Err(self.fail("start", Error::Backend(err)))
            }
        }
    }

    fn stop(&self) {
        let bucket = {
            let mut state = self.state.write();
            if !matches!(*state, ConnectionState::Ready(_)) {
                debug!(state = state.name(), "Stop ignored");
                return;
            }
            match std::mem::replace(&mut *state, ConnectionState::Disconnected) {
                ConnectionState::Ready(bucket) => bucket,
                _ => return,
            }
        };

        bucket.disconnect();
        let label = self.endpoint_label();
        info!(endpoint = %label, "Cache adapter stopped");
        self.events
            .emit(AdapterEvent::Stop(format!("stopped for {}", label)));
    }

    fn is_ready(&self) -> bool {
        matches!(*self.state.read(), ConnectionState::Ready(_))
    }

    fn validate_segment_name(&self, name: &str) -> Result<()> {
        key::validate_segment_name(name)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Envelope>> {
        key.validate()?;
        let bucket = self.bucket()?;

        let backend_key = self.backend_key(key);
        self.events.emit(AdapterEvent::Get(backend_key.clone()));

        if self.should_bypass(bucket.as_ref(), "get", &backend_key) {
            self.metrics.record_miss();
            return Ok(None);
        }

        let document = match bucket.get(&backend_key).await {
            Ok(document) => document,
            Err(err) => {
                self.absorb(err, "get", &backend_key)?;
                self.metrics.record_miss();
                return Ok(None);
            }
        };

        match envelope::decode(&document.value) {
            Ok(Some(envelope)) => {
                self.metrics.record_hit();
                Ok(Some(envelope))
            }
            Ok(None) => {
                self.metrics.record_miss();
                Ok(None)
            }
            Err(err) => Err(self.fail("get", err)),
        }
    }

    async fn set<T>(&self, key: &CacheKey, value: &T, ttl_ms: i64) -> Result<()>
    where
        T: Serialize + Send + Sync + ?Sized,
    {
        key.validate()?;
        if ttl_ms < 0 {
            return Err(Error::InvalidArgument("invalid ttl".to_string()));
        }
        let bucket = self.bucket()?;

        let encoded = envelope::encode(value, ttl_ms).map_err(|e| self.fail("set", e))?;

        let backend_key = self.backend_key(key);
        self.events.emit(AdapterEvent::Set(backend_key.clone()));

        if self.should_bypass(bucket.as_ref(), "set", &backend_key) {
            self.metrics.record_set();
            return Ok(());
        }

        let options = UpsertOptions {
            expiry: to_backend_expiry(encoded.ttl, encoded.stored),
        };
        if let Err(err) = bucket.upsert(&backend_key, encoded.payload, options).await {
            self.absorb(err, "set", &backend_key)?;
        }

        self.metrics.record_set();
        Ok(())
    }

    async fn drop(&self, key: &CacheKey) -> Result<()> {
        key.validate()?;
        let bucket = self.bucket()?;

        let backend_key = self.backend_key(key);
        self.events.emit(AdapterEvent::Drop(backend_key.clone()));

        if self.should_bypass(bucket.as_ref(), "drop", &backend_key) {
            self.metrics.record_drop();
            return Ok(());
        }

        if let Err(err) = bucket.remove(&backend_key).await {
            self.absorb(err, "drop", &backend_key)?;
        }

        self.metrics.record_drop();
        Ok(())
    }
}

impl fmt::Debug for CouchbaseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchbaseCache")
            .field("connector", &self.connector.name())
            .field("bucket", &self.options.bucket_name())
            .field("partition", &self.options.partition())
            .field("state", &self.state.read().name())
            .field("events", &self.events)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Flags, Location};
    use crate::store::{ConnectionSpec, Document, StoreErrorCode, StoreResult};
    use assert_matches::assert_matches;
    use mockito::Matcher;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DAY_MS: i64 = 86_400 * 1000;

    fn mock_cache(options: AdapterOptions) -> (CouchbaseCache, MemoryCluster) {
        let cluster = MemoryCluster::new();
        let cache = CouchbaseCache::with_connector(options, Arc::new(cluster.clone()));
        (cache, cluster)
    }

    fn bypass_options() -> AdapterOptions {
        AdapterOptions {
            flags: Flags {
                bypass_cache_on_conn_error: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Bucket returning canned results for every operation
    struct ScriptedBucket {
        connected: bool,
        get: StoreResult<Document>,
        write: StoreResult<()>,
        calls: AtomicUsize,
    }

    impl ScriptedBucket {
        fn failing(err: StoreError) -> Self {
            Self {
                connected: true,
                get: Err(err.clone()),
                write: Err(err),
                calls: AtomicUsize::new(0),
            }
        }

        fn returning(value: &str) -> Self {
            Self {
                connected: true,
                get: Ok(Document {
                    value: value.to_string(),
                }),
                write: Ok(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Bucket for ScriptedBucket {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn get(&self, _key: &str) -> StoreResult<Document> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.get.clone()
        }

        async fn upsert(&self, _key: &str, _value: String, _options: UpsertOptions) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.write.clone()
        }

        async fn remove(&self, _key: &str) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.write.clone()
        }

        fn disconnect(&self) {}
    }

    struct ScriptedConnector {
        bucket: Arc<ScriptedBucket>,
        open_error: Option<StoreError>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn open_bucket(
            &self,
            _spec: &ConnectionSpec,
            listener: BucketListener,
        ) -> StoreResult<Arc<dyn Bucket>> {
            if let Some(err) = &self.open_error {
                return Err(err.clone());
            }
            listener(BucketEvent::Connected {
                endpoint: "scripted".to_string(),
            });
            Ok(self.bucket.clone())
        }
    }

    async fn scripted_cache(
        options: AdapterOptions,
        bucket: ScriptedBucket,
    ) -> (CouchbaseCache, Arc<ScriptedBucket>) {
        let bucket = Arc::new(bucket);
        let connector = ScriptedConnector {
            bucket: bucket.clone(),
            open_error: None,
        };
        let cache = CouchbaseCache::with_connector(options, Arc::new(connector));
        cache.start().await.unwrap();
        (cache, bucket)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_and_stop() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        assert!(!cache.is_ready());

        cache.start().await.unwrap();
        assert!(cache.is_ready());

        cache.stop();
        assert!(!cache.is_ready());

        // Stopping twice is harmless
        cache.stop();
        assert!(!cache.is_ready());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = starts.clone();
        cache.on(EventKind::Start, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cache.start().await.unwrap();
        cache.start().await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop_sees_same_store() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        let key = CacheKey::new("test", "persist");

        cache.start().await.unwrap();
        cache.set(&key, "kept", 60_000).await.unwrap();
        cache.stop();

        cache.start().await.unwrap();
        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("kept"));
    }

    #[tokio::test]
    async fn test_start_failure_is_fatal() {
        let connector = ScriptedConnector {
            bucket: Arc::new(ScriptedBucket::returning("")),
            open_error: Some(StoreError::new(StoreErrorCode::AuthError, "denied")),
        };
        let cache = CouchbaseCache::with_connector(AdapterOptions::default(), Arc::new(connector));

        let result = cache.start().await;
        assert_matches!(result, Err(Error::Backend(err)) if err.code == StoreErrorCode::AuthError);
        assert!(!cache.is_ready());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        let key = CacheKey::new("test", "foo");

        assert_matches!(cache.get(&key).await, Err(Error::NotReady));
        assert_matches!(cache.drop(&key).await, Err(Error::NotReady));
        assert_matches!(cache.set(&key, "bar", 1000).await, Err(Error::NotReady));
    }

    #[tokio::test]
    async fn test_input_validated_before_readiness() {
        let (cache, _) = mock_cache(AdapterOptions::default());

        assert_matches!(
            cache.set(&CacheKey::default(), "bar", 1000).await,
            Err(Error::InvalidArgument(msg)) if msg == "invalid key"
        );
        assert_matches!(
            cache.set(&CacheKey::new("test", "foo"), "bar", -1).await,
            Err(Error::InvalidArgument(msg)) if msg == "invalid ttl"
        );
        assert_matches!(
            cache.drop(&CacheKey::new("test", "")).await,
            Err(Error::InvalidArgument(_))
        );
    }

    // -------------------------------------------------------------------------
    // Data operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo");
        cache.set(&key, "bar", 1000).await.unwrap();

        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));
        assert_eq!(envelope.ttl, 1000);
        assert!(envelope.stored > 0);
        assert_eq!(cluster.raw_expiry("default", "test:foo"), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_set_and_get_structured_value() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Session {
            user: String,
            roles: Vec<String>,
        }

        let session = Session {
            user: "ada".to_string(),
            roles: vec!["admin".to_string()],
        };
        let key = CacheKey::new("sessions", "abc");
        cache.set(&key, &session, 60_000).await.unwrap();

        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item_as::<Session>().unwrap(), session);
    }

    #[tokio::test]
    async fn test_thirty_day_ttl_is_relative() {
        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo30");
        cache.drop(&key).await.unwrap();
        cache.set(&key, "bar", 29 * DAY_MS).await.unwrap();

        assert_eq!(cluster.raw_expiry("default", "test:foo30"), Some(29 * 86_400));
        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));
    }

    #[tokio::test]
    async fn test_long_ttl_is_absolute() {
        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo31");
        cache.drop(&key).await.unwrap();
        cache.set(&key, "bar", 31 * DAY_MS).await.unwrap();

        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));

        let expected = ((envelope.stored + 31 * DAY_MS) / 1000) as u64;
        assert_eq!(cluster.raw_expiry("default", "test:foo31"), Some(expected));
    }

    #[tokio::test]
    async fn test_huge_ttl_keeps_entry() {
        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "forever");
        cache.set(&key, "bar", i64::MAX).await.unwrap();

        assert_eq!(
            cluster.raw_expiry("default", "test:forever"),
            Some((i64::MAX / 1000) as u64)
        );
        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));
    }

    #[tokio::test]
    async fn test_cyclic_value_is_rejected_before_write() {
        use serde::ser::{Error as _, Serializer};

        struct Cyclic;

        impl Serialize for Cyclic {
            fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(S::Error::custom("converting circular structure to JSON"))
            }
        }

        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let result = cache.set(&CacheKey::new("test", "bar"), &Cyclic, 1000).await;
        assert_matches!(result, Err(Error::Serialization(_)));
        assert_eq!(cluster.document_count("default"), 0);
    }

    #[tokio::test]
    async fn test_drop_item() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "qux");
        cache.set(&key, "foo", 1).await.unwrap();
        cache.drop(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_missing_item() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        cache.drop(&CacheKey::new("test", "never-set")).await.unwrap();
        assert_eq!(cache.stats().errors, 0);
    }

    #[tokio::test]
    async fn test_get_missing_item() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        assert_eq!(cache.get(&CacheKey::new("test", "nope")).await.unwrap(), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_item_is_a_miss() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foobar");
        cache.set(&key, "boom", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_partition_prefixes_backend_key() {
        let options = AdapterOptions {
            partition: Some("web".to_string()),
            ..Default::default()
        };
        let (cache, cluster) = mock_cache(options);
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo");
        assert_eq!(cache.backend_key(&key), "web:test:foo");

        cache.set(&key, "bar", 1000).await.unwrap();
        assert!(cluster.raw_expiry("default", "web:test:foo").is_some());
        assert!(cluster.raw_expiry("default", "test:foo").is_none());
    }

    #[tokio::test]
    async fn test_validate_segment_name() {
        let (cache, _) = mock_cache(AdapterOptions::default());
        assert!(cache.validate_segment_name("test").is_ok());
        for bad in ["", "\n", "\0", "\t", " "] {
            assert!(cache.validate_segment_name(bad).is_err());
        }
    }

    // -------------------------------------------------------------------------
    // Triage & bypass
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bypass_when_store_offline() {
        let (cache, cluster) = mock_cache(bypass_options());
        cluster.set_online(false);
        cache.start().await.unwrap();
        assert!(cache.is_ready());

        let key = CacheKey::new("test", "foo");
        cache.set(&key, "bar", 1000).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.drop(&key).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.bypassed, 3);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.drops, 1);
        assert_eq!(cluster.document_count("default"), 0);
    }

    #[tokio::test]
    async fn test_offline_store_without_bypass_fails() {
        let (cache, cluster) = mock_cache(AdapterOptions::default());
        cluster.set_online(false);
        cache.start().await.unwrap();

        let err = cache.get(&CacheKey::new("test", "foo")).await.unwrap_err();
        assert!(err.is_transient());
        assert_matches!(err, Error::Backend(e) if e.code == StoreErrorCode::NetworkError);
    }

    #[tokio::test]
    async fn test_connection_error_during_operation_is_bypassed() {
        let (cache, bucket) = scripted_cache(
            bypass_options(),
            ScriptedBucket::failing(StoreError::network("generic network failure")),
        )
        .await;
        let key = CacheKey::new("test", "foo");

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.set(&key, "bar", 1000).await.unwrap();
        cache.drop(&key).await.unwrap();

        assert_eq!(bucket.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().bypassed, 3);
    }

    #[tokio::test]
    async fn test_connection_error_without_bypass_is_returned() {
        let (cache, _) = scripted_cache(
            AdapterOptions::default(),
            ScriptedBucket::failing(StoreError::new(StoreErrorCode::ConnectError, "refused")),
        )
        .await;

        assert_matches!(
            cache.set(&CacheKey::new("test", "foo"), "bar", 1000).await,
            Err(Error::Backend(e)) if e.code == StoreErrorCode::ConnectError
        );
    }

    #[tokio::test]
    async fn test_other_backend_errors_pass_through() {
        let (cache, _) = scripted_cache(
            bypass_options(),
            ScriptedBucket::failing(StoreError::new(StoreErrorCode::TemporaryFailure, "busy")),
        )
        .await;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        cache.on(EventKind::Error, move |event| sink.lock().push(event.clone()));

        let err = cache.get(&CacheKey::new("test", "foo")).await.unwrap_err();
        assert_matches!(
            err,
            Error::Backend(ref e) if e.code == StoreErrorCode::TemporaryFailure && e.message == "busy"
        );
        assert_eq!(errors.lock().len(), 1);
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let (cache, _) =
            scripted_cache(AdapterOptions::default(), ScriptedBucket::returning(r#"{"stored":1}"#)).await;
        assert_matches!(
            cache.get(&CacheKey::new("test", "foo")).await,
            Err(Error::InvalidContent)
        );

        let (cache, _) =
            scripted_cache(AdapterOptions::default(), ScriptedBucket::returning("{oops")).await;
        assert_matches!(
            cache.get(&CacheKey::new("test", "foo")).await,
            Err(Error::Serialization(_))
        );
    }

    #[tokio::test]
    async fn test_empty_document_is_a_miss() {
        let (cache, _) = scripted_cache(AdapterOptions::default(), ScriptedBucket::returning("")).await;
        assert_eq!(cache.get(&CacheKey::new("test", "foo")).await.unwrap(), None);
    }

    // -------------------------------------------------------------------------
    // REST store
    // -------------------------------------------------------------------------

    fn rest_options(location: String, bypass: bool) -> AdapterOptions {
        AdapterOptions {
            location: Some(Location::One(location)),
            connection_timeout: Some(50),
            operation_timeout: Some(500),
            flags: Flags {
                bypass_cache_on_conn_error: bypass,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_rest_store_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("GET", "/pools/default/buckets/default")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let upsert = server
            .mock("POST", "/pools/default/buckets/default/docs/test%3Afoo")
            .match_body(Matcher::UrlEncoded("expiry".into(), "1".into()))
            .with_status(200)
            .create_async()
            .await;
        let read = server
            .mock("GET", "/pools/default/buckets/default/docs/test%3Afoo")
            .with_status(200)
            .with_body(
                r#"{"meta":{"id":"test:foo"},"json":{"item":"bar","stored":1700000000000,"ttl":1000}}"#,
            )
            .create_async()
            .await;

        let cache = CouchbaseCache::new(rest_options(server.host_with_port(), false));
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo");
        cache.set(&key, "bar", 1000).await.unwrap();
        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));
        assert_eq!(envelope.stored, 1_700_000_000_000);
        assert_eq!(envelope.ttl, 1000);

        probe.assert_async().await;
        upsert.assert_async().await;
        read.assert_async().await;
    }

    #[tokio::test]
    async fn test_rest_bypass_recovers_when_store_returns() {
        let port = free_port();
        let cache = CouchbaseCache::new(rest_options(format!("127.0.0.1:{}", port), true));
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo");
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.stats().bypassed >= 1);

        let mut server = mockito::Server::new_with_opts_async(mockito::ServerOpts {
            port,
            ..Default::default()
        })
        .await;
        server
            .mock("GET", "/pools/default/buckets/default/docs/test%3Afoo")
            .with_status(200)
            .with_body(r#"{"json":{"item":"bar","stored":1700000000000,"ttl":1000}}"#)
            .create_async()
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let envelope = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(envelope.item, json!("bar"));
        assert_eq!(cache.stats().hits, 1);
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_events_carry_backend_keys() {
        let options = AdapterOptions {
            partition: Some("app".to_string()),
            flags: Flags {
                debug: vec!["events".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let (cache, _) = mock_cache(options);

        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let sink = seen.clone();
            cache.on(kind, move |event| sink.lock().push(event.clone()));
        }

        cache.start().await.unwrap();
        let key = CacheKey::new("test", "foo");
        cache.set(&key, "bar", 1000).await.unwrap();
        cache.get(&key).await.unwrap();
        cache.drop(&key).await.unwrap();
        cache.stop();

        let seen = seen.lock();
        let kinds: Vec<EventKind> = seen.iter().map(AdapterEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Connect,
                EventKind::Start,
                EventKind::Set,
                EventKind::Get,
                EventKind::Drop,
                EventKind::Stop,
            ]
        );
        assert_eq!(seen[0].data(), "connected to default bucket");
        assert_eq!(seen[1].data(), "started for 127.0.0.1:8091/pools/default/buckets/default");
        assert_eq!(seen[2].data(), "app:test:foo");
    }

    #[tokio::test]
    async fn test_mock_flag_selects_memory_store() {
        let options = AdapterOptions {
            flags: Flags {
                is_mock: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let cache = CouchbaseCache::new(options);
        cache.start().await.unwrap();

        let key = CacheKey::new("test", "foo");
        cache.set(&key, &json!({"n": 1}), 1000).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().unwrap().item, json!({"n": 1}));
        assert!(format!("{:?}", cache).contains("mock"));
    }
}
