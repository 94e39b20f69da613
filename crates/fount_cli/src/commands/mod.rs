//! CLI command implementations.

pub mod compact;
pub mod dump_wal;
pub mod inspect;
pub mod verify;

use fount_core::{manifest_path, wal_path, CoreError};
use fount_storage::StorageError;
use std::path::Path;
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// `--path` was not given.
    #[error("store path required (use --path)")]
    PathRequired,

    /// The directory holds neither a manifest nor a WAL.
    #[error("no store found at {0}")]
    NoStore(String),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Log backend error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for commands.
pub type CliResult<T> = Result<T, CliError>;

/// Fails unless `path` looks like a store directory.
pub fn require_store(path: &Path) -> CliResult<()> {
    if manifest_path(path).exists() || wal_path(path).exists() {
        Ok(())
    } else {
        Err(CliError::NoStore(path.display().to_string()))
    }
}

/// Lowercase hex rendering of key bytes.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
