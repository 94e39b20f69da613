//! In-memory log for tests.

use crate::backend::LogBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A log held in memory.
///
/// Clones share the same buffer. A test can hand one clone to a store and
/// keep another to inspect or damage the bytes the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryLogBackend {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-filled with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the current bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Runs `f` with mutable access to the raw buffer.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        f(&mut self.data.write())
    }
}

impl LogBackend for MemoryLogBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.bytes())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if len > size {
            return Err(StorageError::TruncatePastEnd {
                requested: len,
                size,
            });
        }
        data.truncate(len as usize);
        Ok(())
    }
}
