//! Error types for FountDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in FountDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] fount_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A WAL append was given a checksum that does not match its payload.
    #[error("WAL checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    WalCrcMismatch {
        /// Checksum supplied by the caller.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// The manifest file exists but cannot be decoded.
    #[error("manifest corrupt: {message}")]
    ManifestCorrupt {
        /// Description of the decode failure.
        message: String,
    },

    /// An SSTable's footer, index, filter or block is malformed.
    #[error("SSTable corrupt: {message}")]
    SSTableCorrupt {
        /// Description of the corruption.
        message: String,
    },

    /// An SSTable referenced by the manifest is missing on disk.
    #[error("SSTable not found: {path}")]
    SSTableNotFound {
        /// Path that could not be opened.
        path: String,
    },

    /// Another document already owns a unique index key.
    #[error("unique constraint violation on index {index}: key {key:?} already in use")]
    UniqueConstraintViolation {
        /// Index name.
        index: String,
        /// Conflicting key.
        key: String,
    },

    /// A batch required a newer store sequence than the current one.
    #[error("sequence too low: required {required}, current {current}")]
    SequenceTooLow {
        /// Sequence the caller required.
        required: u64,
        /// Store sequence at the time of the check.
        current: u64,
    },

    /// A collection was reopened with a different document type.
    #[error("collection {name} is already open with a different document type")]
    CollectionTypeMismatch {
        /// Collection name.
        name: String,
    },

    /// Another store holds the directory lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Invalid on-disk or in-memory format.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Document or id (de)serialization failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// A fault injector stopped the operation at a named point.
    #[error("injected fault at {point}")]
    InjectedFault {
        /// Name of the fault point.
        point: &'static str,
    },

    /// A rejected write could not be removed from the WAL; the store refuses
    /// further writes until reopened.
    #[error("store failed: {message}")]
    StoreFailed {
        /// What left the store unusable.
        message: String,
    },
}

impl CoreError {
    /// Creates a manifest corruption error.
    pub fn manifest_corrupt(message: impl Into<String>) -> Self {
        Self::ManifestCorrupt {
            message: message.into(),
        }
    }

    /// Creates an SSTable corruption error.
    pub fn sstable_corrupt(message: impl Into<String>) -> Self {
        Self::SSTableCorrupt {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a unique constraint violation.
    pub fn unique_violation(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UniqueConstraintViolation {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Returns true for errors the caller can recover from by changing input.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UniqueConstraintViolation { .. } | Self::SequenceTooLow { .. }
        )
    }
}
