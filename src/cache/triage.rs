//! Backend Error Triage
//!
//! Sorts store status codes into the three classes the adapter acts on. The
//! table is the only place that knows which codes mean what.

use crate::store::{StoreError, StoreErrorCode};

/// How the adapter treats a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The key is not there: a miss on read, a no-op on remove
    NotFound,
    /// The store could not be reached: swallowed in bypass mode
    Connection,
    /// Anything else: returned to the caller
    Other,
}

/// Classify a store status code
pub fn classify(code: StoreErrorCode) -> ErrorClass {
    match code {
        StoreErrorCode::KeyNotFound => ErrorClass::NotFound,
        StoreErrorCode::NetworkError | StoreErrorCode::ConnectError => ErrorClass::Connection,
        StoreErrorCode::AuthError
        | StoreErrorCode::Internal
        | StoreErrorCode::InvalidArgument
        | StoreErrorCode::Generic
        | StoreErrorCode::TemporaryFailure
        | StoreErrorCode::KeyExists
        | StoreErrorCode::UnknownHost
        | StoreErrorCode::ProtocolError
        | StoreErrorCode::Timeout
        | StoreErrorCode::BucketNotFound => ErrorClass::Other,
    }
}

/// Classify a store error
pub fn classify_error(err: &StoreError) -> ErrorClass {
    classify(err.code)
}
