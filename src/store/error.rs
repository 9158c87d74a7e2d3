//! Index store error types
//!
//! Defines all errors that can occur in the ordered index store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the index store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt index file {path:?}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// Backing file does not exist
    #[error("Index file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Key is longer than the index key size
    #[error("Key of {len} bytes exceeds key size {max}")]
    KeyTooLarge { len: usize, max: usize },

    /// The index was marked failed by an earlier write error
    #[error("Index {path:?} is unavailable after a previous failure: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
