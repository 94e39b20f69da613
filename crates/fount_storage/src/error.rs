//! Error types for log backends.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing a log backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A truncate asked for a length beyond the current end of the log.
    #[error("cannot truncate log of {size} bytes to {requested} bytes")]
    TruncatePastEnd {
        /// Requested length.
        requested: u64,
        /// Current length.
        size: u64,
    },

    /// The backend refused the operation (used by test doubles).
    #[error("log backend unavailable: {0}")]
    Unavailable(String),
}
