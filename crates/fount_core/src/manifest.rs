//! Manifest of live tables and the durable sequence.
//!
//! The manifest is a small JSON document, `MANIFEST.json`, replaced
//! atomically on every save. All mutations go through
//! [`ManifestStore::update`], which performs load, modify and save while
//! holding one lock, so flush registration and compaction never overwrite
//! each other's changes.
//!
//! Table paths are written relative to the manifest's directory and
//! resolved against it on load, so the same store opens under any spelling
//! of its path.

use crate::error::{CoreError, CoreResult};
use crate::fault::{FaultInjector, FaultPoint, NoFaults};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Durable store metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Highest sequence captured by a table this manifest references.
    pub sequence: u64,
    /// Live tables by id. Resolved against the store directory once loaded.
    pub tables: BTreeMap<Uuid, PathBuf>,
}

impl Manifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes the manifest as JSON.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::manifest_corrupt(format!("encode failed: {e}")))
    }

    /// Decodes a manifest from JSON.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(data).map_err(|e| CoreError::manifest_corrupt(e.to_string()))
    }
}

/// Reads and writes the manifest file.
pub struct ManifestStore {
    path: PathBuf,
    lock: Mutex<()>,
    faults: Arc<dyn FaultInjector>,
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ManifestStore {
    /// Creates a store for the manifest at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            faults: Arc::new(NoFaults),
        }
    }

    /// Consults `faults` at [`FaultPoint::ManifestSave`] before every write.
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the manifest, returning an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Fails with `ManifestCorrupt` if the file cannot be decoded.
    pub fn load(&self) -> CoreResult<Manifest> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Saves the manifest atomically.
    pub fn save(&self, manifest: &Manifest) -> CoreResult<()> {
        let _guard = self.lock.lock();
        self.save_unlocked(manifest)
    }

    /// Loads, applies `f`, and saves while holding the manifest lock.
    ///
    /// Returns the saved manifest.
    pub fn update<F>(&self, f: F) -> CoreResult<Manifest>
    where
        F: FnOnce(&mut Manifest),
    {
        let _guard = self.lock.lock();
        let mut manifest = self.load_unlocked()?;
        f(&mut manifest);
        self.save_unlocked(&manifest)?;
        Ok(manifest)
    }

    fn load_unlocked(&self) -> CoreResult<Manifest> {
        if !self.path.exists() {
            return Ok(Manifest::default());
        }
        let data = fs::read(&self.path)?;
        let mut manifest = Manifest::decode(&data)?;
        if let Some(root) = self.path.parent() {
            for path in manifest.tables.values_mut() {
                *path = root.join(&*path);
            }
        }
        Ok(manifest)
    }

    /// Copy of `manifest` with table paths inside the store directory
    /// reduced to their file names.
    fn relative(&self, manifest: &Manifest) -> Manifest {
        let mut out = manifest.clone();
        if let Some(root) = self.path.parent() {
            for path in out.tables.values_mut() {
                if let Ok(name) = path.strip_prefix(root) {
                    *path = name.to_path_buf();
                }
            }
        }
        out
    }

    /// Writes to a temp file, syncs it, renames it over the target, then
    /// syncs the directory.
    fn save_unlocked(&self, manifest: &Manifest) -> CoreResult<()> {
        self.faults.check(FaultPoint::ManifestSave)?;
        let data = self.relative(manifest).encode()?;
        let temp_path = self.temp_path();

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Syncs directory entries so renames and deletes survive a crash.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> CoreResult<()> {
    // NTFS journals metadata; directories cannot be opened for fsync.
    Ok(())
}
