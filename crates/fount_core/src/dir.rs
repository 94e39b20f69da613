//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ MANIFEST.json     # Live tables and durable sequence
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ wal.log           # Write-ahead log
//! └─ <uuid>.sst        # One file per live SSTable
//! ```

use crate::error::{CoreError, CoreResult};
use crate::manifest::sync_directory;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MANIFEST_FILE: &str = "MANIFEST.json";
const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const TABLE_EXTENSION: &str = "sst";

/// The store directory, held under an exclusive lock.
///
/// Only one `StoreDir` can exist per directory at a time; the lock is
/// released when the value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if the directory is missing and `create_if_missing`
    ///   is false, or the path is not a directory
    /// - `StoreLocked` if another handle holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the WAL path.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        wal_path(&self.path)
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }

    /// Returns the path for a new table with `id`.
    #[must_use]
    pub fn table_path(&self, id: Uuid) -> PathBuf {
        self.path.join(format!("{id}.{TABLE_EXTENSION}"))
    }

    /// Lists every `.sst` file in the directory, referenced or not.
    pub fn table_files(&self) -> CoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == TABLE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deletes superseded table files and syncs the directory.
    ///
    /// Files that are already gone are ignored.
    pub fn remove_tables<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> CoreResult<()> {
        for path in paths {
            match fs::remove_file(path.as_ref()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        sync_directory(&self.path)
    }

    /// Syncs directory entries.
    pub fn sync(&self) -> CoreResult<()> {
        sync_directory(&self.path)
    }
}

/// Returns the table id encoded in a table file name, if any.
#[must_use]
pub fn table_id(path: &Path) -> Option<Uuid> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| Uuid::parse_str(stem).ok())
}

/// WAL path inside a store directory, usable without taking the lock.
#[must_use]
pub fn wal_path(root: &Path) -> PathBuf {
    root.join(WAL_FILE)
}

/// Manifest path inside a store directory, usable without taking the lock.
#[must_use]
pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("store");
        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(path.join("LOCK").exists());
        assert_eq!(dir.wal_path(), path.join("wal.log"));
        assert_eq!(dir.manifest_path(), path.join("MANIFEST.json"));
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let tmp = tempdir().unwrap();
        let err = StoreDir::open(&tmp.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn second_open_is_locked() {
        let tmp = tempdir().unwrap();
        let _first = StoreDir::open(tmp.path(), true).unwrap();
        assert!(matches!(
            StoreDir::open(tmp.path(), true),
            Err(CoreError::StoreLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempdir().unwrap();
        drop(StoreDir::open(tmp.path(), true).unwrap());
        assert!(StoreDir::open(tmp.path(), true).is_ok());
    }

    #[test]
    fn lists_and_removes_tables() {
        let tmp = tempdir().unwrap();
        let dir = StoreDir::open(tmp.path(), true).unwrap();
        let a = dir.table_path(Uuid::new_v4());
        let b = dir.table_path(Uuid::new_v4());
        fs::write(&a, b"x").unwrap();
        fs::write(&b, b"y").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"z").unwrap();

        assert_eq!(dir.table_files().unwrap().len(), 2);
        dir.remove_tables([&a, &tmp.path().join("gone.sst")]).unwrap();
        assert_eq!(dir.table_files().unwrap(), vec![b]);
    }

    #[test]
    fn table_id_reads_file_stem() {
        let id = Uuid::new_v4();
        assert_eq!(table_id(&Path::new("x/y").join(format!("{id}.sst"))), Some(id));
        assert_eq!(table_id(Path::new("notes.sst")), None);
    }
}
