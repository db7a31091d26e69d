//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache subsystem.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A cache-only read found no usable entry for the key
    #[error("No cached data available for key: {0}")]
    NoCachedData(String),

    /// The caller-supplied live operation failed and no cached entry could
    /// stand in for it.
    ///
    /// Carries the underlying error verbatim; callers see exactly what
    /// `produce` reported.
    #[error(transparent)]
    Produce(#[from] anyhow::Error),

    /// Payload could not be encoded or decoded by the active codec
    #[error("Codec failure for key '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Durable medium failed to read or write
    #[error("Durable storage error: {0}")]
    Storage(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;
