//! Crash simulation for the WAL.
//!
//! [`CrashableLogBackend`] wraps an in-memory log and stops accepting
//! writes at a chosen byte count, leaving a torn record behind the way a
//! power cut would. The bytes stay readable through [`CrashableLogBackend::log`]
//! so a test can reopen a store over what survived.

use fount_storage::{LogBackend, MemoryLogBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CrashState {
    crash_at: AtomicU64,
    written: AtomicU64,
    crashed: AtomicBool,
    fail_sync: AtomicBool,
    fail_truncate: AtomicBool,
}

/// A log backend that can simulate a crash.
///
/// Clones share both the bytes and the crash controls.
#[derive(Debug, Clone)]
pub struct CrashableLogBackend {
    inner: MemoryLogBackend,
    state: Arc<CrashState>,
}

impl CrashableLogBackend {
    /// Creates an empty crashable log.
    pub fn new() -> Self {
        Self::over(MemoryLogBackend::new())
    }

    /// Wraps an existing in-memory log.
    pub fn over(inner: MemoryLogBackend) -> Self {
        let written = inner.bytes().len() as u64;
        Self {
            inner,
            state: Arc::new(CrashState {
                crash_at: AtomicU64::new(u64::MAX),
                written: AtomicU64::new(written),
                crashed: AtomicBool::new(false),
                fail_sync: AtomicBool::new(false),
                fail_truncate: AtomicBool::new(false),
            }),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    ///
    /// The write that crosses the limit is cut short.
    pub fn crash_after(&self, bytes: u64) {
        let written = self.state.written.load(Ordering::SeqCst);
        self.state
            .crash_at
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Makes every sync fail.
    pub fn set_fail_sync(&self, fail: bool) {
        self.state.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Makes every truncate fail, so torn bytes cannot be cut off.
    pub fn set_fail_truncate(&self, fail: bool) {
        self.state.fail_truncate.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the simulated crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Clears the crash and the limit.
    pub fn reset(&self) {
        self.state.crash_at.store(u64::MAX, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.fail_sync.store(false, Ordering::SeqCst);
        self.state.fail_truncate.store(false, Ordering::SeqCst);
    }

    /// Returns the surviving bytes as a plain log.
    pub fn log(&self) -> MemoryLogBackend {
        self.inner.clone()
    }

    fn crashed(reason: &str) -> StorageError {
        StorageError::Unavailable(format!("simulated crash: {reason}"))
    }
}

impl Default for CrashableLogBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBackend for CrashableLogBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        self.inner.read_all()
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(Self::crashed("log is down"));
        }
        let written = self.state.written.load(Ordering::SeqCst);
        let crash_at = self.state.crash_at.load(Ordering::SeqCst);
        let len = data.len() as u64;

        if written.saturating_add(len) > crash_at {
            self.state.crashed.store(true, Ordering::SeqCst);
            let keep = usize::try_from(crash_at.saturating_sub(written)).unwrap_or(data.len());
            if keep > 0 {
                self.inner.append(&data[..keep])?;
                self.state.written.fetch_add(keep as u64, Ordering::SeqCst);
            }
            return Err(Self::crashed("torn write"));
        }

        let offset = self.inner.append(data)?;
        self.state.written.fetch_add(len, Ordering::SeqCst);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(Self::crashed("log is down"));
        }
        if self.state.fail_sync.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(Self::crashed("sync failed"));
        }
        self.inner.sync()
    }

    fn len(&self) -> StorageResult<u64> {
        self.inner.len()
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        if self.state.fail_truncate.load(Ordering::SeqCst) {
            return Err(Self::crashed("truncate failed"));
        }
        self.inner.truncate(len)?;
        self.state.written.store(len, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torn_write_keeps_prefix() {
        let mut log = CrashableLogBackend::new();
        log.append(b"abcd").unwrap();
        log.crash_after(2);

        assert!(log.append(b"efgh").is_err());
        assert!(log.has_crashed());
        assert_eq!(log.log().bytes(), b"abcdef");
        assert!(log.append(b"x").is_err());
        assert!(log.sync().is_err());
    }

    #[test]
    fn failing_sync_takes_log_down() {
        let mut log = CrashableLogBackend::new();
        log.set_fail_sync(true);
        log.append(b"a").unwrap();
        assert!(log.sync().is_err());
        assert!(log.append(b"b").is_err());

        log.reset();
        log.append(b"c").unwrap();
        assert_eq!(log.read_all().unwrap(), b"ac");
    }

    #[test]
    fn failing_truncate_keeps_bytes() {
        let mut log = CrashableLogBackend::new();
        log.append(b"abc").unwrap();
        log.set_fail_truncate(true);
        assert!(log.truncate(1).is_err());
        assert_eq!(log.read_all().unwrap(), b"abc");
    }

    #[test]
    fn wraps_existing_bytes() {
        let mut log = CrashableLogBackend::over(MemoryLogBackend::with_data(b"xyz".to_vec()));
        log.crash_after(1);
        assert!(log.append(b"12").is_err());
        assert_eq!(log.read_all().unwrap(), b"xyz1");
    }
}
