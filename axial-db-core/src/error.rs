//! Error types for axial-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// A caller supplied an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A range is not contained in the declared domain
    #[error("Out of domain: {0}")]
    OutOfDomain(String),

    /// Datatype not in the supported set for the requested operation
    #[error("Unsupported datatype: {0}")]
    UnsupportedDatatype(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query type string did not match any known query type
    #[error("Unknown query type: {0}")]
    UnknownQueryType(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal invariant was violated
    #[error("Internal inconsistency: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an out of domain error
    pub fn out_of_domain(msg: impl Into<String>) -> Self {
        Error::OutOfDomain(msg.into())
    }

    /// Create an unsupported datatype error
    pub fn unsupported_datatype(msg: impl Into<String>) -> Self {
        Error::UnsupportedDatatype(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an internal inconsistency error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
