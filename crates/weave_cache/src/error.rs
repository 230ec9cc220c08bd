//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Reading the cache is fail-safe: an unreadable or corrupt cache file
/// becomes an empty cache unless strict loading was requested, in which case
/// [`CacheError::Corrupt`] is returned. Failing to delete a stale artifact is
/// always an error, since the cache could no longer describe the disk.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files or artifacts.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cache file exists but could not be decoded (strict loading only).
    #[error("cache file {path} is corrupt: {reason}")]
    Corrupt {
        /// The cache file path.
        path: PathBuf,
        /// Description of the decode failure.
        reason: String,
    },

    /// A serialization error occurred while encoding cache records.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A stale generated artifact could not be removed from disk.
    #[error("failed to delete stale artifact {path}: {source}")]
    StaleArtifactDeleteFailed {
        /// The artifact path that could not be deleted.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
