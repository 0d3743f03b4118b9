//! Envelope Codec
//!
//! Every cached value is stored wrapped in an envelope carrying the time it was
//! written and the TTL it was written with, so the front-end can judge
//! freshness on its own:
//!
//! ```text
//! {"item": <value>, "stored": <unix millis>, "ttl": <millis>}
//! ```
//!
//! `item` and `stored` must both be present for an envelope to be valid. An
//! empty payload is not an envelope at all and decodes to `None`.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time in Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Envelope
// =============================================================================

/// A decoded cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// The cached value
    pub item: T,
    /// Write time (Unix millis)
    pub stored: i64,
    /// TTL requested at write time (millis)
    pub ttl: i64,
}

impl<T> Envelope<T> {
    /// Instant the entry stops being fresh (Unix millis)
    pub fn expires_at(&self) -> i64 {
        self.stored.saturating_add(self.ttl)
    }

    /// Whether the entry is stale at `now_ms`
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at()
    }

    /// Milliseconds of freshness left at `now_ms`, zero once stale
    pub fn remaining_ttl(&self, now_ms: i64) -> i64 {
        (self.expires_at() - now_ms).max(0)
    }
}

impl Envelope<Value> {
    /// Deserialize the opaque item into a concrete type
    pub fn item_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.item.clone())?)
    }
}

/// Borrowing form used for encoding so callers keep ownership of the value
#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    item: &'a T,
    stored: i64,
    ttl: i64,
}

/// Shape accepted on decode; presence checks happen after parsing
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    item: Option<Value>,
    #[serde(default)]
    stored: Option<i64>,
    #[serde(default)]
    ttl: Option<i64>,
}

// =============================================================================
// Codec
// =============================================================================

/// An envelope serialized for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEnvelope {
    /// UTF-8 JSON payload
    pub payload: String,
    /// Write time stamped into the payload
    pub stored: i64,
    /// TTL stamped into the payload
    pub ttl: i64,
}

/// Wrap `value` with the current time and `ttl_ms`
pub fn encode<T: Serialize + ?Sized>(value: &T, ttl_ms: i64) -> Result<EncodedEnvelope> {
    encode_at(value, ttl_ms, now_millis())
}

/// Wrap `value` with an explicit write time
pub fn encode_at<T: Serialize + ?Sized>(
    value: &T,
    ttl_ms: i64,
    stored: i64,
) -> Result<EncodedEnvelope> {
    let payload = serde_json::to_string(&EnvelopeRef {
        item: value,
        stored,
        ttl: ttl_ms,
    })?;

    Ok(EncodedEnvelope {
        payload,
        stored,
        ttl: ttl_ms,
    })
}

/// Parse a stored payload
///
/// Returns `Ok(None)` for an empty payload, `Error::Serialization` when the
/// payload is not valid JSON of the expected shape, and
/// `Error::InvalidContent` when `item` or `stored` is missing.
pub fn decode(payload: &str) -> Result<Option<Envelope>> {
    if payload.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(payload)?;
    if !value.is_object() {
        return Err(Error::InvalidContent);
    }

    let raw: RawEnvelope = serde_json::from_value(value)?;
    match (raw.item, raw.stored) {
        (Some(item), Some(stored)) if stored != 0 => Ok(Some(Envelope {
            item,
            stored,
            ttl: raw.ttl.unwrap_or(0),
        })),
        _ => Err(Error::InvalidContent),
    }
}
