//! Operation counters.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let store = Store::open(path, Config::default())?;
//! let notes = store.collection::<Note>("notes")?;
//! notes.put(&note)?;
//! assert_eq!(store.metrics().puts, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live operation counters for a store.
#[derive(Debug, Default)]
pub struct StoreStats {
    puts: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    index_lookups: AtomicU64,
    batches: AtomicU64,
    histories: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_history(&self) {
        self.histories.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            histories: self.histories.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.puts.store(0, Ordering::Relaxed);
        self.gets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.scans.store(0, Ordering::Relaxed);
        self.index_lookups.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.histories.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Documents written.
    pub puts: u64,
    /// Point reads.
    pub gets: u64,
    /// Documents deleted.
    pub deletes: u64,
    /// Collection scans.
    pub scans: u64,
    /// Index queries of any kind.
    pub index_lookups: u64,
    /// Committed batches.
    pub batches: u64,
    /// History reads.
    pub histories: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let stats = StoreStats::new();
        stats.record_put();
        stats.record_put();
        stats.record_get();
        stats.record_index_lookup();
        stats.record_batch();

        let m = stats.snapshot();
        assert_eq!(m.puts, 2);
        assert_eq!(m.gets, 1);
        assert_eq!(m.index_lookups, 1);
        assert_eq!(m.batches, 1);
        assert_eq!(m.deletes, 0);

        stats.reset();
        assert_eq!(stats.snapshot(), Metrics::default());
    }
}
