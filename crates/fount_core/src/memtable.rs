//! In-memory write buffer.
//!
//! The memtable holds every mutation that has reached the WAL but not yet an
//! SSTable. Entries stay sorted by `(key, sequence)` and are not
//! deduplicated; a flush drains them all at once.

use parking_lot::Mutex;

/// A pending mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemtableEntry {
    /// Store key.
    pub key: Vec<u8>,
    /// New value, or `None` for a delete.
    pub value: Option<Vec<u8>>,
    /// Sequence of the mutation.
    pub sequence: u64,
}

impl MemtableEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: Vec<u8>, value: Option<Vec<u8>>, sequence: u64) -> Self {
        Self {
            key,
            value,
            sequence,
        }
    }

    /// Returns true if the entry deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Listener notified with drained entries once they are durable in a table.
pub type FlushCallback = Box<dyn Fn(&[MemtableEntry]) + Send + Sync>;

/// Sorted buffer of pending writes.
pub struct Memtable {
    entries: Mutex<Vec<MemtableEntry>>,
    callbacks: Mutex<Vec<FlushCallback>>,
    limit: usize,
}

impl Memtable {
    /// Creates an empty memtable that reports over-limit above `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            limit,
        }
    }

    /// Inserts an entry, keeping `(key, sequence)` order.
    pub fn put(&self, entry: MemtableEntry) {
        let mut entries = self.entries.lock();
        let at = entries.partition_point(|e| {
            (e.key.as_slice(), e.sequence) <= (entry.key.as_slice(), entry.sequence)
        });
        entries.insert(at, entry);
    }

    /// Returns the newest entry for `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<MemtableEntry> {
        let entries = self.entries.lock();
        let end = entries.partition_point(|e| e.key.as_slice() <= key);
        entries[..end]
            .last()
            .filter(|e| e.key == key)
            .cloned()
    }

    /// Returns entries whose key starts with `prefix`, or all entries.
    #[must_use]
    pub fn scan(&self, prefix: Option<&[u8]>) -> Vec<MemtableEntry> {
        let entries = self.entries.lock();
        match prefix {
            Some(p) => entries
                .iter()
                .filter(|e| e.key.starts_with(p))
                .cloned()
                .collect(),
            None => entries.clone(),
        }
    }

    /// Returns the number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the configured limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns true once the entry count exceeds the limit.
    #[must_use]
    pub fn is_over_limit(&self) -> bool {
        self.len() > self.limit
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<MemtableEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Registers a flush listener.
    pub fn on_flush(&self, callback: FlushCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Invokes every flush listener with `drained`.
    pub fn fire_flush_callbacks(&self, drained: &[MemtableEntry]) {
        for callback in self.callbacks.lock().iter() {
            callback(drained);
        }
    }
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("len", &self.len())
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
