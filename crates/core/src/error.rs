//! Error type shared by the index, persistence and evaluation layers.

/// Errors returned by recallkit operations.
///
/// Every error is surfaced to the caller of the failing operation; nothing is
/// retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid index construction parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not supported by this index (e.g. `remove` when removal is disabled).
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Invalid argument to a single call (e.g. `k == 0`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Evaluator input does not have the expected shape.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Vector dimensionality differs from the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the index.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// Adding another item would exceed the index capacity.
    #[error("Size limit exceeded: index holds at most {capacity} items")]
    SizeLimitExceeded {
        /// The configured `max_item_count`.
        capacity: usize,
    },

    /// Persistence read/write failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot failed its checksum, could not be decoded, or is inconsistent.
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
