//! Error types for the cachectl crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing cache entries
#[derive(Error, Debug)]
pub enum Error {
    /// Blob store I/O failed
    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key not present in the store
    #[error("cache key not found: {0}")]
    KeyNotFound(String),

    /// Key would escape the store root
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    /// Encoding a record failed
    #[error("failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
