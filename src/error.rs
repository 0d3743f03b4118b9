//! Error types for the cache adapter
//!
//! Input validation errors are raised before any network call. Backend
//! failures that reach the caller are wrapped verbatim in [`Error::Backend`].

use crate::cache::triage::{classify_error, ErrorClass};
use crate::store::StoreError;
use thiserror::Error;

/// Unified error type for the adapter
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("cache server is not ready")]
    NotReady,

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Malformed key, bad ttl or unusable segment name
    #[error("{0}")]
    InvalidArgument(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache content")]
    InvalidContent,

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend error: {0}")]
    Backend(#[from] StoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was raised by input validation
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Whether the error is a connection-class backend failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Backend(err) if classify_error(err) == ErrorClass::Connection)
    }
}

/// Result type alias for the adapter
pub type Result<T> = std::result::Result<T, Error>;
