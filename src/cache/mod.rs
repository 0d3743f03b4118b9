//! Couchbase Cache Adapter
//!
//! Storage engine for a segment/id keyed cache front-end, persisting entries
//! as JSON envelopes in a Couchbase bucket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CouchbaseCache (adapter)                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │ Key Builder  │  │   Envelope   │  │    Expiry    │  │   Triage   │   │
//! │  │ (urlencoded) │  │    Codec     │  │  Translator  │  │ (codes)    │   │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘   │
//! │         │                  │                 │                │          │
//! │         └──────────────────┴────────┬────────┴────────────────┘          │
//! │                                     │                                    │
//! │                         ┌───────────┴───────────┐                        │
//! │                         │  Bucket (store trait) │                        │
//! │                         │  REST  |  in-memory   │                        │
//! │                         └───────────────────────┘                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  • Readiness gate               • Bypass on connection errors            │
//! │  • Observer events              • Cache-line aligned counters            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use couchcache::cache::{CacheKey, CouchbaseCache};
//! use couchcache::{AdapterOptions, CacheEngine};
//!
//! let cache = CouchbaseCache::new(AdapterOptions::default());
//! cache.start().await?;
//!
//! let key = CacheKey::new("sessions", "abc");
//! cache.set(&key, "hello", 60_000).await?;
//!
//! if let Some(envelope) = cache.get(&key).await? {
//!     println!("{} stored at {}", envelope.item, envelope.stored);
//! }
//!
//! cache.drop(&key).await?;
//! cache.stop();
//! ```

pub mod adapter;
pub mod envelope;
pub mod events;
pub mod expiry;
pub mod key;
pub mod metrics;
pub mod triage;

// Re-export main types
pub use adapter::CouchbaseCache;
pub use envelope::{EncodedEnvelope, Envelope};
pub use events::{AdapterEvent, EventHub, EventKind, Observer};
pub use expiry::{to_backend_expiry, RELATIVE_TTL_MAX_MS};
pub use key::{build_key, validate_segment_name, CacheKey};
pub use metrics::{AdapterMetrics, AdapterStatsSnapshot};
pub use triage::{classify, classify_error, ErrorClass};
