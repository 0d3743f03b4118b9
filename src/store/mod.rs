//! Document Store Client
//!
//! The narrow interface the cache adapter needs from the backing document store:
//! open a bucket, read/write/remove a document, and report connectivity.
//!
//! Two implementations are provided:
//! - [`MemoryCluster`]: in-process mock store with the same expiry semantics
//! - [`RestConnector`]: the store's document REST endpoints over HTTP

mod memory;
mod rest;

pub use memory::{MemoryBucket, MemoryCluster};
pub use rest::{RestBucket, RestConnector};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Status Codes
// =============================================================================

/// Status codes reported by the store client
///
/// Discriminants match the numeric codes documented by the store's client
/// library so they survive being logged or compared against external tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StoreErrorCode {
    /// Authentication against the bucket failed
    AuthError = 2,
    /// Internal error inside the client or server
    Internal = 6,
    /// Invalid arguments were passed to the server
    InvalidArgument = 7,
    /// Generic failure
    Generic = 10,
    /// Temporary failure, the server is busy
    TemporaryFailure = 11,
    /// The key already exists with a different CAS value
    KeyExists = 12,
    /// The key does not exist on the server
    KeyNotFound = 13,
    /// Generic network failure
    NetworkError = 16,
    /// The host name could not be resolved
    UnknownHost = 21,
    /// Protocol error, the response could not be understood
    ProtocolError = 22,
    /// The operation timed out
    Timeout = 23,
    /// Error while establishing a connection to the server
    ConnectError = 24,
    /// The bucket does not exist
    BucketNotFound = 25,
}

impl StoreErrorCode {
    /// Numeric value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value
    pub fn from_i32(code: i32) -> Option<Self> {
        let code = match code {
            2 => StoreErrorCode::AuthError,
            6 => StoreErrorCode::Internal,
            7 => StoreErrorCode::InvalidArgument,
            10 => StoreErrorCode::Generic,
            11 => StoreErrorCode::TemporaryFailure,
            12 => StoreErrorCode::KeyExists,
            13 => StoreErrorCode::KeyNotFound,
            16 => StoreErrorCode::NetworkError,
            21 => StoreErrorCode::UnknownHost,
            22 => StoreErrorCode::ProtocolError,
            23 => StoreErrorCode::Timeout,
            24 => StoreErrorCode::ConnectError,
            25 => StoreErrorCode::BucketNotFound,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Error reported by the store client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn key_not_found(key: &str) -> Self {
        Self::new(
            StoreErrorCode::KeyNotFound,
            format!("the key does not exist on the server: {}", key),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NetworkError, message)
    }
}

/// Result type alias for store client calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Connection
// =============================================================================

/// Everything needed to open a bucket
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    /// Endpoint addresses, tried in order
    pub locations: Vec<String>,
    /// Bucket name
    pub bucket: String,
    /// Optional credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect timeout, forwarded to the client
    pub connection_timeout: Duration,
    /// Per-operation timeout, forwarded to the client
    pub operation_timeout: Duration,
}

/// Connectivity notifications raised by a bucket
#[derive(Debug, Clone)]
pub enum BucketEvent {
    /// The bucket connected to the server
    Connected { endpoint: String },
    /// A connection-level failure occurred outside of an operation
    Error(StoreError),
}

/// Callback receiving bucket notifications
pub type BucketListener = Arc<dyn Fn(BucketEvent) + Send + Sync>;

/// A stored document as returned by the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Raw document body
    pub value: String,
}

/// Options for an upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Expiry in store units: 0 never expires, up to 30 days relative
    /// seconds, above that an absolute Unix timestamp in seconds
    pub expiry: u64,
}

// =============================================================================
// Ports
// =============================================================================

/// Opens bucket handles
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Open a bucket handle
    ///
    /// Fatal configuration problems (unknown bucket, rejected credentials)
    /// are returned as errors. Transient network problems are reported
    /// through `listener` and leave the handle disconnected.
    async fn open_bucket(
        &self,
        spec: &ConnectionSpec,
        listener: BucketListener,
    ) -> StoreResult<Arc<dyn Bucket>>;
}

/// An open bucket handle
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name
    fn name(&self) -> &str;

    /// Whether the handle currently has a live connection
    fn is_connected(&self) -> bool;

    /// Fetch a document
    async fn get(&self, key: &str) -> StoreResult<Document>;

    /// Insert or replace a document
    async fn upsert(&self, key: &str, value: String, options: UpsertOptions) -> StoreResult<()>;

    /// Remove a document
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Close the handle
    fn disconnect(&self);
}
