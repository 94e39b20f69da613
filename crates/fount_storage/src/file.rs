//! File-backed log.

use crate::backend::LogBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log stored in a single OS file.
///
/// The file is opened without truncation, so reopening an existing path
/// continues where the previous process left off. `sync` calls
/// `File::sync_all`.
///
/// ```no_run
/// use fount_storage::{FileLogBackend, LogBackend};
/// use std::path::Path;
///
/// let mut log = FileLogBackend::open(Path::new("wal.log")).unwrap();
/// log.append(b"record").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLogBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileLogBackend {
    /// Opens or creates the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Opens the log, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLogBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::End(0))?;
        if let Err(e) = file.write_all(data) {
            // a partial write may have extended the file
            self.size = file.metadata().map_or(offset, |m| m.len());
            return Err(e.into());
        }
        self.size += data.len() as u64;

        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        if len > self.size {
            return Err(StorageError::TruncatePastEnd {
                requested: len,
                size: self.size,
            });
        }

        let file = self.file.get_mut();
        file.set_len(len)?;
        file.sync_all()?;
        self.size = len;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let log = FileLogBackend::open(&path).unwrap();
        assert!(path.exists());
        assert!(log.is_empty().unwrap());
    }

    #[test]
    fn append_returns_offsets() {
        let dir = tempdir().unwrap();
        let mut log = FileLogBackend::open(&dir.path().join("wal.log")).unwrap();

        assert_eq!(log.append(b"abc").unwrap(), 0);
        assert_eq!(log.append(b"defg").unwrap(), 3);
        assert_eq!(log.len().unwrap(), 7);
        assert_eq!(log.read_all().unwrap(), b"abcdefg");
    }

    #[test]
    fn reopen_keeps_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut log = FileLogBackend::open(&path).unwrap();
            log.append(b"durable").unwrap();
            log.sync().unwrap();
        }

        let mut log = FileLogBackend::open(&path).unwrap();
        assert_eq!(log.len().unwrap(), 7);
        assert_eq!(log.append(b"!").unwrap(), 7);
        assert_eq!(log.read_all().unwrap(), b"durable!");
    }

    #[test]
    fn truncate_shrinks_and_rejects_growth() {
        let dir = tempdir().unwrap();
        let mut log = FileLogBackend::open(&dir.path().join("wal.log")).unwrap();
        log.append(b"0123456789").unwrap();

        log.truncate(4).unwrap();
        assert_eq!(log.read_all().unwrap(), b"0123");

        let err = log.truncate(100).unwrap_err();
        assert!(matches!(
            err,
            StorageError::TruncatePastEnd {
                requested: 100,
                size: 4
            }
        ));
    }

    #[test]
    fn create_dirs_for_nested_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("wal.log");

        let log = FileLogBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(log.path(), path);
    }
}
