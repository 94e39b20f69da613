//! WAL writer and reader.

use crate::error::CoreResult;
use crate::wal::record::WalRecord;
use fount_storage::LogBackend;
use parking_lot::Mutex;

/// Result of replaying the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records in the valid prefix, in log order.
    pub records: Vec<WalRecord>,
    /// Byte length of the valid prefix.
    pub valid_bytes: u64,
    /// Total log length.
    pub total_bytes: u64,
}

impl ReplayReport {
    /// Returns true if bytes after the valid prefix were ignored.
    #[must_use]
    pub fn has_damaged_tail(&self) -> bool {
        self.valid_bytes < self.total_bytes
    }
}

/// Manages WAL appends and replay over a [`LogBackend`].
pub struct WalManager {
    backend: Mutex<Box<dyn LogBackend>>,
}

impl WalManager {
    /// Creates a WAL over the given backend.
    pub fn new(backend: Box<dyn LogBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Appends a record at the end of the log.
    ///
    /// Returns the offset where the record was written.
    ///
    /// # Errors
    ///
    /// Fails with `WalCrcMismatch` if the record carries a non-zero checksum
    /// that does not match its payload.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        let data = record.frame()?;
        self.append_bytes(&data)
    }

    /// Appends several records as one write.
    ///
    /// Every record is framed before anything is written, so a bad checksum
    /// leaves the log unchanged.
    pub fn append_all(&self, records: &[WalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&record.frame()?);
        }
        self.append_bytes(&data)
    }

    /// A failed append is cut back to the previous length so no partial
    /// record sits in front of later ones.
    fn append_bytes(&self, data: &[u8]) -> CoreResult<u64> {
        let mut backend = self.backend.lock();
        let before = backend.len()?;
        match backend.append(data) {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(undo) = backend.truncate(before) {
                    tracing::error!(error = %undo, len = before, "failed to drop partial WAL record");
                }
                Err(e.into())
            }
        }
    }

    /// Makes all appended records durable.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns every record in the valid prefix of the log.
    pub fn replay(&self) -> CoreResult<Vec<WalRecord>> {
        Ok(self.replay_report()?.records)
    }

    /// Replays the log and reports where the valid prefix ends.
    pub fn replay_report(&self) -> CoreResult<ReplayReport> {
        let data = self.backend.lock().read_all()?;
        let mut offset = 0;
        let mut records = Vec::new();
        while let Some((record, consumed)) = WalRecord::unframe(&data, offset) {
            records.push(record);
            offset += consumed;
        }
        if offset < data.len() {
            tracing::warn!(
                valid = offset,
                total = data.len(),
                "ignoring damaged WAL tail"
            );
        }
        Ok(ReplayReport {
            records,
            valid_bytes: offset as u64,
            total_bytes: data.len() as u64,
        })
    }

    /// Clears the log.
    pub fn truncate(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        backend.sync()?;
        Ok(())
    }

    /// Cuts the log back to `len` bytes, dropping a damaged tail.
    pub fn truncate_to(&self, len: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(len)?;
        backend.sync()?;
        Ok(())
    }

    /// Cuts the log back to `len` bytes without syncing.
    ///
    /// Drops records of a write that failed after reaching the log. The next
    /// successful sync makes the cut durable.
    pub fn rollback(&self, len: u64) -> CoreResult<()> {
        self.backend.lock().truncate(len)?;
        Ok(())
    }

    /// Returns the log length in bytes.
    pub fn len(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().len()?)
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager").finish_non_exhaustive()
    }
}
