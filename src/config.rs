//! Adapter Configuration
//!
//! Construction-time options. Field names are camelCase on the wire:
//!
//! ```yaml
//! location: ["10.0.0.1:8091", "10.0.0.2:8091"]
//! bucket: sessions
//! partition: web
//! connectionTimeout: 1000
//! operationTimeout: 1000
//! flags:
//!   bypassCacheOnConnError: true
//!   debug: [events]
//! ```

use crate::error::Result;
use crate::store::ConnectionSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default store location
pub const DEFAULT_LOCATION: &str = "127.0.0.1:8091";

/// Default bucket name
pub const DEFAULT_BUCKET: &str = "default";

/// Partition value meaning "no partition"
pub const NO_PARTITION: &str = "NONE";

/// Default connect and operation timeout (millis)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// Location
// =============================================================================

/// One endpoint or a list of endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    One(String),
    Many(Vec<String>),
}

impl Location {
    /// Flatten into endpoint addresses, splitting comma-joined strings
    pub fn endpoints(&self) -> Vec<String> {
        let parts: Vec<&str> = match self {
            Location::One(s) => s.split(',').collect(),
            Location::Many(list) => list.iter().flat_map(|s| s.split(',')).collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// =============================================================================
// Flags
// =============================================================================

/// Behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flags {
    /// Treat connection-level store failures as misses / no-op writes
    pub bypass_cache_on_conn_error: bool,
    /// Diagnostic switches; `"events"` logs every adapter event
    pub debug: Vec<String>,
    /// Use the in-process mock store
    pub is_mock: bool,
}

impl Flags {
    /// Whether event logging was requested
    pub fn debug_events(&self) -> bool {
        self.debug.iter().any(|d| d == "events")
    }
}

// =============================================================================
// Adapter Options
// =============================================================================

/// Adapter options, all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdapterOptions {
    /// Store endpoint(s)
    pub location: Option<Location>,
    /// Bucket name
    pub bucket: Option<String>,
    /// Key prefix shared by every entry of this adapter
    pub partition: Option<String>,
    /// Store credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect timeout (millis)
    pub connection_timeout: Option<u64>,
    /// Per-operation timeout (millis)
    pub operation_timeout: Option<u64>,
    pub flags: Flags,
}

impl AdapterOptions {
    /// Load options from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse options from YAML (JSON is accepted too)
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Resolved endpoint addresses
    pub fn locations(&self) -> Vec<String> {
        let endpoints = self
            .location
            .as_ref()
            .map(Location::endpoints)
            .unwrap_or_default();
        if endpoints.is_empty() {
            vec![DEFAULT_LOCATION.to_string()]
        } else {
            endpoints
        }
    }

    /// Resolved bucket name
    pub fn bucket_name(&self) -> &str {
        match self.bucket.as_deref() {
            Some(bucket) if !bucket.is_empty() => bucket,
            _ => DEFAULT_BUCKET,
        }
    }

    /// Resolved partition, honouring the "no partition" sentinel
    pub fn partition(&self) -> Option<&str> {
        self.partition
            .as_deref()
            .filter(|p| !p.is_empty() && *p != NO_PARTITION)
    }

    /// Resolved connect timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(non_zero_or_default(self.connection_timeout))
    }

    /// Resolved operation timeout
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(non_zero_or_default(self.operation_timeout))
    }

    /// Build the store connection parameters
    pub fn connection_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            locations: self.locations(),
            bucket: self.bucket_name().to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
            connection_timeout: self.connection_timeout(),
            operation_timeout: self.operation_timeout(),
        }
    }
}

fn non_zero_or_default(value: Option<u64>) -> u64 {
    match value {
        Some(ms) if ms > 0 => ms,
        _ => DEFAULT_TIMEOUT_MS,
    }
}
