//! Couchbase cache adapter
//!
//! Backend engine for a generic caching front-end. Entries are addressed by a
//! `(segment, id)` pair, optionally namespaced by a partition, and stored as
//! JSON envelopes with a server-side expiry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    Caching front-end (CacheEngine)                    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                          CouchbaseCache                               │
//! │   start / stop / is_ready / get / set / drop / validate_segment_name  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                    Store client (Connector/Bucket)                    │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────────┐  │
//! │  │   RestConnector (reqwest)    │  │  MemoryCluster (isMock)      │  │
//! │  └──────────────────────────────┘  └──────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: The adapter, key builder, envelope codec and expiry rules
//! - [`store`]: Document-store client traits and implementations
//! - [`config`]: Adapter options
//! - [`domain`]: The cache engine contract
//! - [`error`]: Error types and handling

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use cache::{
    AdapterEvent, AdapterStatsSnapshot, CacheKey, CouchbaseCache, Envelope, EventKind,
};

pub use config::{AdapterOptions, Flags, Location};

pub use domain::ports::CacheEngine;

pub use error::{Error, Result};

pub use store::{
    Bucket, Connector, MemoryCluster, RestConnector, StoreError, StoreErrorCode,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
