//! Store configuration.

use crate::events::EventSink;
use crate::fault::{FaultInjector, NoFaults};
use std::fmt;
use std::sync::Arc;

/// Configuration for opening a store.
#[derive(Clone)]
pub struct Config {
    /// Cache budget in bytes. Advisory; recorded for callers sizing caches.
    pub cache_bytes: usize,

    /// Result limit for scans that do not pass one.
    pub default_scan_limit: usize,

    /// Memtable entry count above which a flush is triggered.
    pub memtable_limit: usize,

    /// Whether to fsync the WAL after every commit.
    pub sync_on_write: bool,

    /// Whether to run a compaction tick on a background thread after each flush.
    pub background_compaction: bool,

    /// Whether to clear the WAL once a flush has been recorded in the manifest.
    pub truncate_wal_on_flush: bool,

    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Receives a structured event for every collection operation.
    pub event_sink: Option<EventSink>,

    /// Crash-point hooks consulted on the write and flush paths.
    pub fault_injector: Arc<dyn FaultInjector>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_bytes: 64 << 20, // 64 MiB
            default_scan_limit: 100,
            memtable_limit: 1024,
            sync_on_write: true,
            background_compaction: true,
            truncate_wal_on_flush: false,
            create_if_missing: true,
            event_sink: None,
            fault_injector: Arc::new(NoFaults),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cache_bytes", &self.cache_bytes)
            .field("default_scan_limit", &self.default_scan_limit)
            .field("memtable_limit", &self.memtable_limit)
            .field("sync_on_write", &self.sync_on_write)
            .field("background_compaction", &self.background_compaction)
            .field("truncate_wal_on_flush", &self.truncate_wal_on_flush)
            .field("create_if_missing", &self.create_if_missing)
            .field("event_sink", &self.event_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache budget.
    #[must_use]
    pub const fn cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_bytes = bytes;
        self
    }

    /// Sets the default scan limit.
    #[must_use]
    pub const fn default_scan_limit(mut self, limit: usize) -> Self {
        self.default_scan_limit = limit;
        self
    }

    /// Sets the memtable flush threshold.
    #[must_use]
    pub const fn memtable_limit(mut self, limit: usize) -> Self {
        self.memtable_limit = limit;
        self
    }

    /// Sets whether to fsync the WAL after every commit.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether flushes trigger background compaction.
    #[must_use]
    pub const fn background_compaction(mut self, value: bool) -> Self {
        self.background_compaction = value;
        self
    }

    /// Sets whether the WAL is cleared after each flush.
    #[must_use]
    pub const fn truncate_wal_on_flush(mut self, value: bool) -> Self {
        self.truncate_wal_on_flush = value;
        self
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Installs an event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: EventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Installs a fault injector.
    #[must_use]
    pub fn fault_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.fault_injector = injector;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.cache_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_scan_limit, 100);
        assert_eq!(config.memtable_limit, 1024);
        assert!(config.sync_on_write);
        assert!(config.create_if_missing);
        assert!(!config.truncate_wal_on_flush);
        assert!(config.event_sink.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .memtable_limit(8)
            .default_scan_limit(10)
            .background_compaction(false)
            .sync_on_write(false);

        assert_eq!(config.memtable_limit, 8);
        assert_eq!(config.default_scan_limit, 10);
        assert!(!config.background_compaction);
        assert!(!config.sync_on_write);
    }

    #[test]
    fn debug_hides_callbacks() {
        let rendered = format!("{:?}", Config::default());
        assert!(rendered.contains("memtable_limit: 1024"));
        assert!(rendered.contains("event_sink: false"));
    }
}
