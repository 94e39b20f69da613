//! The log backend trait.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// # Invariants
///
/// - `append` writes at the current end and returns the offset it wrote at
/// - `read_all` returns every byte appended since the last `truncate`
/// - after `sync` returns, appended bytes survive process termination
pub trait LogBackend: Send + Sync {
    /// Reads the entire log.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended bytes durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current length in bytes.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if nothing has been appended.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Shrinks the log to `len` bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::TruncatePastEnd`] if `len` is larger
    /// than the current length.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;
}
