//! Cache Keys
//!
//! Caller-facing `(segment, id)` keys and their translation into backend keys.
//!
//! A backend key is `[partition ":"] segment [":" id]` where every component is
//! percent-encoded on its own first. Encoding turns any `:` inside a component
//! into `%3A`, so the separators in the final string are unambiguous and two
//! distinct triples can never produce the same backend key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key components
pub const KEY_SEPARATOR: char = ':';

// =============================================================================
// Cache Key
// =============================================================================

/// Key supplied by the caching front-end
///
/// An empty string stands for an absent component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Logical namespace for a family of entries
    #[serde(default)]
    pub segment: String,
    /// Entry identifier within the segment
    #[serde(default)]
    pub id: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(segment: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            id: id.into(),
        }
    }

    /// Whether both components are present
    pub fn is_complete(&self) -> bool {
        !self.segment.is_empty() && !self.id.is_empty()
    }

    /// Reject keys missing a segment or id
    pub fn validate(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::InvalidArgument("invalid key".to_string()))
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.segment, KEY_SEPARATOR, self.id)
    }
}

// =============================================================================
// Key Builder
// =============================================================================

/// Compose the backend key for `key` under an optional partition
///
/// Absent components contribute nothing; rejecting incomplete keys is up to
/// the caller.
pub fn build_key(partition: Option<&str>, key: &CacheKey) -> String {
    let mut out = String::new();

    if let Some(partition) = partition.filter(|p| !p.is_empty()) {
        out.push_str(&urlencoding::encode(partition));
        out.push(KEY_SEPARATOR);
    }
    if !key.segment.is_empty() {
        out.push_str(&urlencoding::encode(&key.segment));
    }
    if !key.id.is_empty() {
        out.push(KEY_SEPARATOR);
        out.push_str(&urlencoding::encode(&key.id));
    }

    out
}

// =============================================================================
// Segment Names
// =============================================================================

/// Characters a segment name may not contain
const FORBIDDEN_SEGMENT_CHARS: [char; 4] = ['\n', '\0', '\t', ' '];

/// Check that a segment name is usable
pub fn validate_segment_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(&FORBIDDEN_SEGMENT_CHARS[..]) {
        return Err(Error::InvalidArgument("invalid segment name".to_string()));
    }
    Ok(())
}
