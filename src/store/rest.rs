//! REST Document Store Client
//!
//! Talks to the document endpoints the store exposes on its management port:
//!
//! - `GET    /pools/default/buckets/{bucket}`            connect probe
//! - `GET    /pools/default/buckets/{bucket}/docs/{key}` read
//! - `POST   /pools/default/buckets/{bucket}/docs/{key}` upsert (form: value, flags, expiry)
//! - `DELETE /pools/default/buckets/{bucket}/docs/{key}` remove
//!
//! Transport failures and HTTP statuses are mapped onto [`StoreErrorCode`] so
//! the adapter never sees `reqwest` types.

use crate::store::{
    Bucket, BucketEvent, BucketListener, ConnectionSpec, Connector, Document, StoreError,
    StoreErrorCode, StoreResult, UpsertOptions,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Management port used when a location carries no port
const DEFAULT_PORT: u16 = 8091;

// =============================================================================
// Connector
// =============================================================================

/// Opens buckets over the document REST endpoints
#[derive(Debug, Clone, Default)]
pub struct RestConnector;

impl RestConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RestConnector {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn open_bucket(
        &self,
        spec: &ConnectionSpec,
        listener: BucketListener,
    ) -> StoreResult<Arc<dyn Bucket>> {
        if spec.locations.is_empty() {
            return Err(StoreError::new(
                StoreErrorCode::InvalidArgument,
                "no store locations configured",
            ));
        }

        let client = Client::builder()
            .connect_timeout(spec.connection_timeout)
            .timeout(spec.operation_timeout)
            .user_agent(format!("couchcache/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                StoreError::new(StoreErrorCode::Internal, format!("failed to build client: {}", e))
            })?;

        let bases: Vec<String> = spec.locations.iter().map(|l| endpoint_base(l)).collect();
        let mut last_error = None;

        for base in &bases {
            let bucket = RestBucket::new(spec, client.clone(), base.clone(), listener.clone());
            match bucket.probe().await {
                Ok(()) => {
                    info!(endpoint = %base, bucket = %spec.bucket, "Connected to bucket");
                    bucket.connected.store(true, Ordering::Release);
                    listener(BucketEvent::Connected {
                        endpoint: base.clone(),
                    });
                    return Ok(Arc::new(bucket));
                }
                Err(e) if is_fatal_probe_error(&e) => return Err(e),
                Err(e) => {
                    warn!(endpoint = %base, error = %e, "Bucket probe failed");
                    last_error = Some(e);
                }
            }
        }

        // Nothing reachable: hand back a disconnected handle on the first
        // endpoint. It reports itself connected again once the reconnect
        // window has passed, letting the next operation retry.
        if let Some(e) = last_error {
            listener(BucketEvent::Error(e));
        }
        let bucket = RestBucket::new(spec, client, bases[0].clone(), listener);
        bucket.mark_unreachable();
        Ok(Arc::new(bucket))
    }
}

fn is_fatal_probe_error(err: &StoreError) -> bool {
    matches!(
        err.code,
        StoreErrorCode::BucketNotFound | StoreErrorCode::AuthError | StoreErrorCode::InvalidArgument
    )
}

/// Turn a configured location into a `scheme://host:port` base URL
fn endpoint_base(location: &str) -> String {
    let location = location.trim().trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = location.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = location.strip_prefix("http://") {
        ("http", rest)
    } else if let Some(rest) = location.strip_prefix("couchbase://") {
        ("http", rest)
    } else {
        ("http", location)
    };

    let host = rest.split('/').next().unwrap_or(rest);
    if host.contains(':') {
        format!("{}://{}", scheme, host)
    } else {
        format!("{}://{}:{}", scheme, host, DEFAULT_PORT)
    }
}

// =============================================================================
// Bucket
// =============================================================================

#[derive(Debug, Deserialize)]
struct DocResponse {
    json: Option<serde_json::Value>,
    base64: Option<String>,
}

/// Bucket handle backed by the REST endpoints
pub struct RestBucket {
    name: String,
    client: Client,
    base: String,
    username: Option<String>,
    password: Option<String>,
    connected: AtomicBool,
    closed: AtomicBool,
    /// Earliest instant a disconnected handle may try the endpoint again
    retry_at: Mutex<Option<Instant>>,
    reconnect_interval: Duration,
    listener: BucketListener,
}

impl RestBucket {
    fn new(spec: &ConnectionSpec, client: Client, base: String, listener: BucketListener) -> Self {
        Self {
            name: spec.bucket.clone(),
            client,
            base,
            username: spec.username.clone(),
            password: spec.password.clone(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            retry_at: Mutex::new(None),
            reconnect_interval: spec.connection_timeout,
            listener,
        }
    }

    /// Endpoint this handle talks to
    pub fn endpoint(&self) -> &str {
        &self.base
    }

    /// Mark the endpoint unreachable for one reconnect window
    fn mark_unreachable(&self) {
        self.connected.store(false, Ordering::Release);
        *self.retry_at.lock() = Some(Instant::now() + self.reconnect_interval);
    }

    fn bucket_url(&self) -> String {
        format!(
            "{}/pools/default/buckets/{}",
            self.base,
            urlencoding::encode(&self.name)
        )
    }

    fn doc_url(&self, key: &str) -> String {
        format!("{}/docs/{}", self.bucket_url(), urlencoding::encode(key))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    async fn probe(&self) -> StoreResult<()> {
        let response = self
            .authorize(self.client.get(self.bucket_url()))
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::new(
                StoreErrorCode::BucketNotFound,
                format!("bucket not found: {}", self.name),
            )),
            status => Err(map_status(status, &self.name)),
        }
    }

    /// Send a request, tracking connectivity from the outcome
    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::network("bucket handle is closed"));
        }

        match self.authorize(request).send().await {
            Ok(response) => {
                *self.retry_at.lock() = None;
                if !self.connected.swap(true, Ordering::AcqRel) {
                    info!(endpoint = %self.base, bucket = %self.name, "Reconnected to bucket");
                    (self.listener)(BucketEvent::Connected {
                        endpoint: self.base.clone(),
                    });
                }
                Ok(response)
            }
            Err(e) => {
                let err = map_transport_error(e);
                if matches!(
                    err.code,
                    StoreErrorCode::NetworkError | StoreErrorCode::ConnectError
                ) {
                    self.mark_unreachable();
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Bucket for RestBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self.connected.load(Ordering::Acquire) {
            return true;
        }
        let retry_at = *self.retry_at.lock();
        retry_at.map_or(true, |at| Instant::now() >= at)
    }

    async fn get(&self, key: &str) -> StoreResult<Document> {
        let response = self.send(self.client.get(self.doc_url(key))).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, key));
        }

        let body: DocResponse = response.json().await.map_err(|e| {
            StoreError::new(
                StoreErrorCode::ProtocolError,
                format!("unreadable document response: {}", e),
            )
        })?;

        let value = match (body.json, body.base64) {
            (Some(json), _) => json.to_string(),
            // Non-JSON documents come back base64 encoded and fail envelope decoding
            (None, Some(raw)) => raw,
            (None, None) => String::new(),
        };
        Ok(Document { value })
    }

    async fn upsert(&self, key: &str, value: String, options: UpsertOptions) -> StoreResult<()> {
        let expiry = options.expiry.to_string();
        let form = [
            ("value", value.as_str()),
            ("flags", "0"),
            ("expiry", expiry.as_str()),
        ];

        let response = self
            .send(self.client.post(self.doc_url(key)).form(&form))
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_status(status, key))
        }
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let response = self.send(self.client.delete(self.doc_url(key))).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(map_status(status, key))
        }
    }

    fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        debug!(endpoint = %self.base, bucket = %self.name, "Disconnected bucket handle");
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

fn map_transport_error(err: reqwest::Error) -> StoreError {
    let code = if err.is_timeout() {
        StoreErrorCode::Timeout
    } else if err.is_connect() || err.is_request() {
        StoreErrorCode::NetworkError
    } else if err.is_decode() || err.is_body() {
        StoreErrorCode::ProtocolError
    } else if err.is_builder() {
        StoreErrorCode::InvalidArgument
    } else {
        StoreErrorCode::Generic
    };
    StoreError::new(code, err.to_string())
}

fn map_status(status: StatusCode, subject: &str) -> StoreError {
    let code = match status {
        StatusCode::NOT_FOUND => StoreErrorCode::KeyNotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreErrorCode::AuthError,
        StatusCode::BAD_REQUEST => StoreErrorCode::InvalidArgument,
        StatusCode::CONFLICT => StoreErrorCode::KeyExists,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            StoreErrorCode::TemporaryFailure
        }
        s if s.is_server_error() => StoreErrorCode::Internal,
        _ => StoreErrorCode::Generic,
    };
    StoreError::new(code, format!("store responded {} for {}", status, subject))
}

// =============================================================================
// Tests
// =============================================================================
