//! Error types for axial-db-label

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Dimension-label query error type
#[derive(Error, Debug)]
pub enum Error {
    /// Error surfaced by the core array layer
    #[error(transparent)]
    Core(#[from] axial_db_core::Error),

    /// A range query was asked for an order it does not support
    #[error("Unsupported label order: {0}")]
    UnsupportedOrder(String),

    /// Ordered-write attempted onto a non-empty label
    #[error("Single-fragment label: {0}")]
    SingleFragmentLabel(String),

    /// An unordered write or unordered-label read is missing the
    /// dimension data buffer
    #[error("Missing index buffer: {0}")]
    MissingIndexBuffer(String),

    /// Neither bounded probe produced a matching cell
    #[error("Label range not found: {0}")]
    LabelRangeNotFound(String),

    /// The on-disk label schema disagrees with the parent schema's label
    /// reference
    #[error("Label schema mismatch: {0}")]
    LabelSchemaMismatch(String),

    /// Dimension labels combined with a query type that does not support
    /// them
    #[error("Unsupported for query type: {0}")]
    UnsupportedForQueryType(String),

    /// An internal invariant was violated
    #[error("Internal inconsistency: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unsupported order error
    pub fn unsupported_order(msg: impl Into<String>) -> Self {
        Error::UnsupportedOrder(msg.into())
    }

    /// Create a single-fragment label error
    pub fn single_fragment_label(msg: impl Into<String>) -> Self {
        Error::SingleFragmentLabel(msg.into())
    }

    /// Create a missing index buffer error
    pub fn missing_index_buffer(msg: impl Into<String>) -> Self {
        Error::MissingIndexBuffer(msg.into())
    }

    /// Create a label range not found error
    pub fn label_range_not_found(msg: impl Into<String>) -> Self {
        Error::LabelRangeNotFound(msg.into())
    }

    /// Create a label schema mismatch error
    pub fn label_schema_mismatch(msg: impl Into<String>) -> Self {
        Error::LabelSchemaMismatch(msg.into())
    }

    /// Create an unsupported-for-query-type error
    pub fn unsupported_for_query_type(msg: impl Into<String>) -> Self {
        Error::UnsupportedForQueryType(msg.into())
    }

    /// Create an internal inconsistency error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
