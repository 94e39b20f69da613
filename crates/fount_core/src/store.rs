//! Store coordinator and recovery.

use crate::collection::{split_key, Collection, CollectionShared, Document, StagedRecord};
use crate::compaction::{CompactionReport, Compactor};
use crate::config::Config;
use crate::dir::{table_id, StoreDir};
use crate::error::{CoreError, CoreResult};
use crate::events::{self, LogEvent};
use crate::fault::FaultPoint;
use crate::manifest::{Manifest, ManifestStore};
use crate::memtable::{Memtable, MemtableEntry};
use crate::sstable::{SSTable, SSTableHandle, TableEntry};
use crate::stats::{Metrics, StoreStats};
use crate::types::{SequenceNumber, Snapshot};
use crate::wal::{WalManager, WalPayload, WalRecord};
use fount_storage::{FileLogBackend, LogBackend};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

/// The main store handle.
///
/// `Store` owns the WAL, manifest, memtable and compactor of one directory
/// and hands out typed [`Collection`]s. It is cheap to clone; clones share
/// the same state.
///
/// # Opening a Store
///
/// ```rust,ignore
/// use fount_core::{Config, Store};
///
/// let store = Store::open("data", Config::default().memtable_limit(4096))?;
/// let notes = store.collection::<Note>("notes")?;
/// notes.put(&note)?;
/// store.close()?;
/// ```
///
/// # Recovery
///
/// Opening rebuilds every collection from the manifest's tables plus the WAL
/// records newer than the manifest sequence. A damaged WAL tail is cut off.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Shared store state. Collections hold an `Arc` to it.
pub(crate) struct StoreInner {
    config: Config,
    dir: Arc<StoreDir>,
    wal: WalManager,
    manifest: Arc<ManifestStore>,
    memtable: Memtable,
    compactor: Arc<Compactor>,
    /// Highest allocated or observed sequence.
    sequence: Mutex<u64>,
    /// Serializes WAL appends, memtable inserts and flushes.
    write_lock: Mutex<()>,
    pub(crate) stats: StoreStats,
    collections: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    /// Records read at open for collections not yet requested.
    staged: Mutex<HashMap<String, Vec<StagedRecord>>>,
    compaction_thread: Mutex<Option<JoinHandle<()>>>,
    /// Set when a rejected write could not be removed from the WAL.
    failed: AtomicBool,
}

fn stage(
    staged: &mut HashMap<String, Vec<StagedRecord>>,
    key: &[u8],
    value: Option<Vec<u8>>,
    sequence: u64,
) {
    match split_key(key) {
        Some((name, id)) => staged.entry(name.to_string()).or_default().push(StagedRecord {
            id: id.to_vec(),
            value,
            sequence,
        }),
        None => tracing::warn!(sequence, "skipping record with malformed key"),
    }
}

impl Store {
    /// Opens a store in `path`, creating it if allowed by the config.
    ///
    /// # Errors
    ///
    /// - `StoreLocked` if another handle has the directory open
    /// - `ManifestCorrupt` / `SSTableCorrupt` if durable state is damaged
    /// - I/O errors
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        let backend = FileLogBackend::open_with_create_dirs(&dir.wal_path())?;
        Self::open_dir(dir, config, Box::new(backend))
    }

    /// Opens a store whose WAL lives in `backend` instead of `wal.log`.
    ///
    /// Tables and the manifest still live in `path`.
    pub fn open_with_backend(
        path: impl AsRef<Path>,
        config: Config,
        backend: Box<dyn LogBackend>,
    ) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        Self::open_dir(dir, config, backend)
    }

    fn open_dir(dir: StoreDir, config: Config, backend: Box<dyn LogBackend>) -> CoreResult<Self> {
        let dir = Arc::new(dir);
        let manifest = Arc::new(
            ManifestStore::new(dir.manifest_path()).with_faults(Arc::clone(&config.fault_injector)),
        );
        let wal = WalManager::new(backend);
        let memtable = Memtable::new(config.memtable_limit);
        let compactor = Arc::new(Compactor::new(Arc::clone(&dir), Arc::clone(&manifest)));

        let current = manifest.load()?;
        let mut sequence = current.sequence;
        let mut staged = HashMap::new();

        for (id, path) in &current.tables {
            let handle = SSTableHandle::new(*id, path.clone());
            for entry in SSTable::scan(&handle)? {
                sequence = sequence.max(entry.value.sequence);
                stage(&mut staged, &entry.key, entry.value.value, entry.value.sequence);
            }
        }
        remove_orphan_tables(&dir, &current)?;

        let report = wal.replay_report()?;
        if report.has_damaged_tail() {
            wal.truncate_to(report.valid_bytes)?;
        }
        let mut replayed = 0usize;
        for record in report.records {
            if record.sequence <= current.sequence {
                continue;
            }
            let payload = match WalPayload::decode(&record.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(sequence = record.sequence, error = %e, "skipping undecodable WAL record");
                    continue;
                }
            };
            sequence = sequence.max(record.sequence);
            stage(&mut staged, &payload.key, payload.value.clone(), record.sequence);
            memtable.put(MemtableEntry::new(payload.key, payload.value, record.sequence));
            replayed += 1;
        }

        tracing::info!(
            path = %dir.path().display(),
            sequence,
            tables = current.tables.len(),
            replayed,
            "store opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                dir,
                wal,
                manifest,
                memtable,
                compactor,
                sequence: Mutex::new(sequence),
                write_lock: Mutex::new(()),
                stats: StoreStats::new(),
                collections: Mutex::new(HashMap::new()),
                staged: Mutex::new(staged),
                compaction_thread: Mutex::new(None),
                failed: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the collection `name`, creating it on first use.
    ///
    /// The first call for a name replays that collection's recovered records.
    ///
    /// # Errors
    ///
    /// - `CollectionTypeMismatch` if `name` was opened with another type
    /// - `InvalidFormat` if `name` contains a NUL byte
    pub fn collection<T: Document>(&self, name: &str) -> CoreResult<Collection<T>> {
        if name.contains('\0') {
            return Err(CoreError::invalid_format("collection names cannot contain NUL"));
        }
        let mut registry = self.inner.collections.lock();
        if let Some(existing) = registry.get(name) {
            let shared = Arc::clone(existing)
                .downcast::<CollectionShared<T>>()
                .map_err(|_| CoreError::CollectionTypeMismatch {
                    name: name.to_string(),
                })?;
            return Ok(Collection::new(shared, Arc::clone(&self.inner)));
        }

        let shared = Arc::new(CollectionShared::<T>::new(name.to_string()));
        let records = self.inner.staged.lock().remove(name).unwrap_or_default();
        shared.bootstrap(records);
        let erased: Arc<dyn Any + Send + Sync> = shared.clone();
        registry.insert(name.to_string(), erased);
        Ok(Collection::new(shared, Arc::clone(&self.inner)))
    }

    /// Captures the current sequence for snapshot reads.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::at(self.inner.current_sequence())
    }

    /// Returns the current sequence.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.inner.current_sequence())
    }

    /// Allocates one sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.inner.allocate_sequences(1)
    }

    /// Allocates `count` contiguous sequence numbers, returning the first.
    pub fn allocate_sequences(&self, count: u64) -> u64 {
        self.inner.allocate_sequences(count)
    }

    /// Returns operation counters.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.inner.stats.snapshot()
    }

    /// Zeroes operation counters.
    pub fn reset_metrics(&self) {
        self.inner.stats.reset();
    }

    /// Registers a listener called with the entries of every flush.
    pub fn on_flush(&self, callback: impl Fn(&[MemtableEntry]) + Send + Sync + 'static) {
        self.inner.memtable.on_flush(Box::new(callback));
    }

    /// Writes the memtable to a new table.
    pub fn flush(&self) -> CoreResult<()> {
        let _write = self.inner.write_lock.lock();
        self.inner.flush_locked()
    }

    /// Runs a compaction tick on the calling thread.
    ///
    /// Returns a skipped report if a background tick is in progress.
    pub fn compact(&self) -> CoreResult<CompactionReport> {
        self.inner.compactor.try_tick()
    }

    /// Returns handles for the tables in the manifest.
    pub fn tables(&self) -> CoreResult<Vec<SSTableHandle>> {
        let manifest = self.inner.manifest.load()?;
        Ok(manifest
            .tables
            .into_iter()
            .map(|(id, path)| SSTableHandle::new(id, path))
            .collect())
    }

    /// Number of entries waiting in the memtable.
    #[must_use]
    pub fn pending_entries(&self) -> usize {
        self.inner.memtable.len()
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.dir.path()
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Waits for background compaction and syncs the WAL.
    ///
    /// The directory lock is released once every handle is dropped.
    pub fn close(&self) -> CoreResult<()> {
        let _write = self.inner.write_lock.lock();
        self.inner.join_compaction();
        self.inner.wal.sync()?;
        tracing::debug!(path = %self.inner.dir.path().display(), "store closed");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.dir.path())
            .field("sequence", &self.inner.current_sequence())
            .finish_non_exhaustive()
    }
}

impl StoreInner {
    pub(crate) fn current_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    pub(crate) fn allocate_sequences(&self, count: u64) -> u64 {
        let mut sequence = self.sequence.lock();
        let start = *sequence + 1;
        *sequence += count;
        start
    }

    pub(crate) fn default_scan_limit(&self) -> usize {
        self.config.default_scan_limit
    }

    pub(crate) fn emit(&self, event: LogEvent) {
        events::emit(self.config.event_sink.as_ref(), event);
    }

    /// Makes `writes` durable and buffers them, returning the first sequence.
    ///
    /// With `at`, the writes take sequences from `at` upward and the counter
    /// is raised to cover them. A failed flush after a durable write is
    /// logged; the entries stay buffered for the next flush.
    ///
    /// A write rejected after reaching the WAL is cut from it, so it never
    /// reappears on reopen. If the cut fails the store stops accepting
    /// writes.
    pub(crate) fn commit(
        &self,
        writes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
        at: Option<u64>,
    ) -> CoreResult<u64> {
        let payloads = writes
            .iter()
            .map(|(key, value)| {
                WalPayload {
                    key: key.clone(),
                    value: value.clone(),
                }
                .encode()
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let _write = self.write_lock.lock();
        if self.failed.load(Ordering::Acquire) {
            return Err(CoreError::StoreFailed {
                message: "an earlier write could not be rolled back; reopen the store".into(),
            });
        }
        let count = writes.len() as u64;
        let start = match at {
            Some(start) => {
                let mut sequence = self.sequence.lock();
                *sequence = (*sequence).max(start.saturating_add(count.saturating_sub(1)));
                start
            }
            None => self.allocate_sequences(count),
        };

        let records: Vec<WalRecord> = payloads
            .into_iter()
            .zip(start..)
            .map(|(payload, seq)| WalRecord::with_checksum(seq, payload))
            .collect();
        let wal_len = self.wal.len()?;
        if let Err(e) = self.write_wal(&records) {
            self.rollback_wal(wal_len);
            return Err(e);
        }

        for ((key, value), seq) in writes.into_iter().zip(start..) {
            self.memtable.put(MemtableEntry::new(key, value, seq));
        }
        if self.memtable.is_over_limit() {
            if let Err(e) = self.flush_locked() {
                tracing::warn!(error = %e, "memtable flush failed; entries stay buffered");
            }
        }
        Ok(start)
    }

    fn write_wal(&self, records: &[WalRecord]) -> CoreResult<()> {
        self.wal.append_all(records)?;
        self.config.fault_injector.check(FaultPoint::WalAppend)?;
        if self.config.sync_on_write {
            self.wal.sync()?;
        }
        self.config.fault_injector.check(FaultPoint::WalSync)
    }

    fn rollback_wal(&self, len: u64) {
        if let Err(e) = self.wal.rollback(len) {
            tracing::error!(error = %e, len, "failed to roll back rejected write; store is failed");
            self.failed.store(true, Ordering::Release);
        }
    }

    /// Writes the memtable to a table and records it in the manifest.
    /// Caller holds the write lock.
    fn flush_locked(&self) -> CoreResult<()> {
        self.config.fault_injector.check(FaultPoint::MemtableFlush)?;
        let drained = self.memtable.drain();
        if drained.is_empty() {
            return Ok(());
        }

        let entries: Vec<TableEntry> = drained
            .iter()
            .map(|e| TableEntry::new(e.key.clone(), e.sequence, e.value.clone()))
            .collect();
        let max_sequence = drained.iter().map(|e| e.sequence).max().unwrap_or(0);
        let id = Uuid::new_v4();
        let path = self.dir.table_path(id);

        if let Err(e) = SSTable::create_with_id(id, &path, &entries) {
            self.restore(drained);
            self.discard_table(&path);
            return Err(e);
        }
        let updated = self.manifest.update(|m| {
            m.tables.insert(id, path.clone());
            m.sequence = m.sequence.max(max_sequence);
        });
        if let Err(e) = updated {
            self.restore(drained);
            self.discard_table(&path);
            return Err(e);
        }

        if self.config.truncate_wal_on_flush {
            self.wal.truncate()?;
        }
        tracing::debug!(table = %id, entries = entries.len(), max_sequence, "memtable flushed");
        self.memtable.fire_flush_callbacks(&drained);

        if self.config.background_compaction {
            self.spawn_compaction();
        }
        Ok(())
    }

    fn restore(&self, drained: Vec<MemtableEntry>) {
        for entry in drained {
            self.memtable.put(entry);
        }
    }

    fn discard_table(&self, path: &Path) {
        if let Err(e) = self.dir.remove_tables([path]) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove unused table");
        }
    }

    fn spawn_compaction(&self) {
        let mut slot = self.compaction_thread.lock();
        if let Some(handle) = slot.take() {
            if !handle.is_finished() {
                *slot = Some(handle);
                return;
            }
            let _ = handle.join();
        }
        let compactor = Arc::clone(&self.compactor);
        let spawned = std::thread::Builder::new()
            .name("fount-compaction".to_string())
            .spawn(move || {
                compactor.tick();
            });
        match spawned {
            Ok(handle) => *slot = Some(handle),
            Err(e) => tracing::warn!(error = %e, "failed to spawn compaction thread"),
        }
    }

    fn join_compaction(&self) {
        if let Some(handle) = self.compaction_thread.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("compaction thread panicked");
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.join_compaction();
    }
}

/// Deletes table files the manifest does not reference.
///
/// These are left behind when a flush or compaction fails between writing a
/// table and recording it.
/// Files are matched by the id in their name, never by path spelling.
fn remove_orphan_tables(dir: &StoreDir, manifest: &Manifest) -> CoreResult<()> {
    let orphans: Vec<PathBuf> = dir
        .table_files()?
        .into_iter()
        .filter(|path| !table_id(path).is_some_and(|id| manifest.tables.contains_key(&id)))
        .collect();
    if !orphans.is_empty() {
        tracing::warn!(count = orphans.len(), "removing unreferenced tables");
        dir.remove_tables(&orphans)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{codec, DocumentId};
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u64,
        name: String,
    }

    impl Document for Item {
        type Id = u64;

        fn id(&self) -> u64 {
            self.id
        }

        fn encode(&self) -> CoreResult<Vec<u8>> {
            codec::to_cbor(self)
        }

        fn decode(bytes: &[u8]) -> CoreResult<Self> {
            codec::from_cbor(bytes)
        }
    }

    #[derive(Debug, Clone)]
    struct Tag(u64);

    impl Document for Tag {
        type Id = u64;

        fn id(&self) -> u64 {
            self.0
        }

        fn encode(&self) -> CoreResult<Vec<u8>> {
            Ok(self.0.to_be_bytes().to_vec())
        }

        fn decode(bytes: &[u8]) -> CoreResult<Self> {
            u64::from_key_bytes(bytes).map(Tag)
        }
    }

    fn item(id: u64, name: &str) -> Item {
        Item {
            id,
            name: name.into(),
        }
    }

    fn config() -> Config {
        Config::default().background_compaction(false)
    }

    #[test]
    fn sequences_are_contiguous() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), config()).unwrap();
        assert_eq!(store.next_sequence(), 1);
        assert_eq!(store.allocate_sequences(3), 2);
        assert_eq!(store.next_sequence(), 5);
        assert_eq!(store.snapshot(), Snapshot::at(5));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = Store::open(dir.path(), config()).unwrap();
        let err = Store::open(dir.path(), config()).unwrap_err();
        assert!(matches!(err, CoreError::StoreLocked));
    }

    #[test]
    fn collection_type_is_checked() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), config()).unwrap();
        let _items = store.collection::<Item>("items").unwrap();
        let err = store.collection::<Tag>("items").unwrap_err();
        assert!(matches!(err, CoreError::CollectionTypeMismatch { .. }));
        assert!(store.collection::<Item>("bad\0name").is_err());
    }

    #[test]
    fn put_at_raises_sequence() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), config()).unwrap();
        let items = store.collection::<Item>("items").unwrap();
        assert_eq!(items.put_at(&item(1, "a"), 40).unwrap(), 40);
        assert_eq!(items.put(&item(2, "b")).unwrap(), 41);
    }

    #[test]
    fn flush_moves_memtable_to_table() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), config()).unwrap();
        let items = store.collection::<Item>("items").unwrap();
        items.put(&item(1, "a")).unwrap();
        items.put(&item(2, "b")).unwrap();
        assert_eq!(store.pending_entries(), 2);

        store.flush().unwrap();
        assert_eq!(store.pending_entries(), 0);
        let tables = store.tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(SSTable::stats(&tables[0]).unwrap().entries, 2);

        // empty flush writes nothing
        store.flush().unwrap();
        assert_eq!(store.tables().unwrap().len(), 1);
    }

    #[test]
    fn flush_listeners_see_entries() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), config()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_flush(move |entries| sink.lock().extend(entries.iter().map(|e| e.sequence)));

        let items = store.collection::<Item>("items").unwrap();
        items.put(&item(1, "a")).unwrap();
        items.delete(&1).unwrap();
        store.flush().unwrap();
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn orphan_tables_are_removed_on_open() {
        let dir = tempdir().unwrap();
        let orphan = dir.path().join(format!("{}.sst", Uuid::new_v4()));
        {
            let _store = Store::open(dir.path(), config()).unwrap();
            SSTable::create(&orphan, &[TableEntry::new(b"x\0k".to_vec(), 1, None)]).unwrap();
        }
        let _store = Store::open(dir.path(), config()).unwrap();
        assert!(!orphan.exists());
    }
}
