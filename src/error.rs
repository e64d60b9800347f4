//! Error types for the media cache engine

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the cache engine
///
/// The public `get`/`set`/`delete` surface of [`crate::cache::CacheEngine`]
/// never returns these; they are logged there and degraded into a miss or
/// `false`. Maintenance operations and store implementations propagate them.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistent store failure
    #[error("Store operation '{operation}' failed: {reason}")]
    Store { operation: String, reason: String },

    /// A bounded operation did not complete in time
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// Stored entry could not be decoded
    #[error("Corrupt cache entry {id}: {reason}")]
    CorruptEntry { id: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}

impl Error {
    /// Build a store error for the named operation
    pub fn store(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Store {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = Error::store("set", "disk full");
        assert_eq!(err.to_string(), "Store operation 'set' failed: disk full");
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            operation: "get".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
    }
}
