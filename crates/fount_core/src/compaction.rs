//! Table compaction.
//!
//! A tick groups live tables whose key ranges overlap and rewrites each group
//! of two or more tables as a single table. For every key the entry with the
//! highest sequence survives; tombstones are kept so deletes still shadow
//! older data after a restart.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change logical state
//! - The manifest is updated before superseded files are deleted
//! - At most one tick runs at a time per compactor

use crate::dir::StoreDir;
use crate::error::CoreResult;
use crate::manifest::ManifestStore;
use crate::sstable::{SSTable, SSTableHandle, TableEntry};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one compaction tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// True if another tick was already running.
    pub skipped: bool,
    /// Overlap groups rewritten.
    pub groups_merged: usize,
    /// Tables removed from the manifest.
    pub tables_removed: usize,
    /// Entries read from merged tables.
    pub entries_in: usize,
    /// Entries written to new tables.
    pub entries_out: usize,
}

/// A live table and its key range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRange {
    /// Table id.
    pub id: Uuid,
    /// Smallest key.
    pub first: Vec<u8>,
    /// Largest key.
    pub last: Vec<u8>,
    /// Table file.
    #[serde(skip)]
    pub handle: SSTableHandle,
}

/// Merges tables with overlapping key ranges.
#[derive(Debug)]
pub struct Compactor {
    dir: Arc<StoreDir>,
    manifest: Arc<ManifestStore>,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Compactor {
    /// Creates a compactor over the store's directory and manifest.
    pub fn new(dir: Arc<StoreDir>, manifest: Arc<ManifestStore>) -> Self {
        Self {
            dir,
            manifest,
            running: AtomicBool::new(false),
        }
    }

    /// Returns true while a tick is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one tick, logging instead of returning errors.
    pub fn tick(&self) -> CompactionReport {
        match self.try_tick() {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "compaction tick failed");
                CompactionReport::default()
            }
        }
    }

    /// Runs one tick.
    ///
    /// Returns a report with `skipped` set if another tick is running.
    pub fn try_tick(&self) -> CoreResult<CompactionReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("compaction already running");
            return Ok(CompactionReport {
                skipped: true,
                ..CompactionReport::default()
            });
        }
        let _guard = RunningGuard(&self.running);

        let mut report = CompactionReport::default();
        for group in self.plan()? {
            if group.len() < 2 {
                continue;
            }
            let (entries_in, entries_out) = self.merge(&group)?;
            report.groups_merged += 1;
            report.tables_removed += group.len();
            report.entries_in += entries_in;
            report.entries_out += entries_out;
        }
        if report.groups_merged > 0 {
            tracing::info!(
                groups = report.groups_merged,
                tables = report.tables_removed,
                entries_in = report.entries_in,
                entries_out = report.entries_out,
                "compaction finished"
            );
        }
        Ok(report)
    }

    /// Groups live tables by overlapping key ranges, ordered by lower bound.
    ///
    /// Empty tables are left out.
    pub fn plan(&self) -> CoreResult<Vec<Vec<TableRange>>> {
        let manifest = self.manifest.load()?;
        let mut ranges = Vec::with_capacity(manifest.tables.len());
        for (id, path) in &manifest.tables {
            let handle = SSTableHandle::new(*id, path.clone());
            if let Some((first, last)) = SSTable::key_range(&handle)? {
                ranges.push(TableRange {
                    id: *id,
                    first,
                    last,
                    handle,
                });
            }
        }
        Ok(group_overlapping(ranges))
    }

    fn merge(&self, group: &[TableRange]) -> CoreResult<(usize, usize)> {
        let mut entries = Vec::new();
        for range in group {
            entries.extend(SSTable::scan(&range.handle)?);
        }
        let entries_in = entries.len();
        let merged = newest_per_key(entries);

        let id = Uuid::new_v4();
        let path = self.dir.table_path(id);
        SSTable::create_with_id(id, &path, &merged)?;

        let update = self.manifest.update(|m| {
            for range in group {
                m.tables.remove(&range.id);
            }
            m.tables.insert(id, path.clone());
        });
        if let Err(e) = update {
            if let Err(cleanup) = self.dir.remove_tables([&path]) {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove unused table");
            }
            return Err(e);
        }

        let old: Vec<_> = group.iter().map(|r| r.handle.path.clone()).collect();
        self.dir.remove_tables(&old)?;
        tracing::debug!(new = %id, replaced = group.len(), "merged tables");
        Ok((entries_in, merged.len()))
    }
}

/// Greedily groups ranges whose extents overlap, tracking the running upper bound.
fn group_overlapping(mut ranges: Vec<TableRange>) -> Vec<Vec<TableRange>> {
    ranges.sort_by(|a, b| a.first.cmp(&b.first));
    let mut groups: Vec<Vec<TableRange>> = Vec::new();
    let mut upper: Vec<u8> = Vec::new();
    for range in ranges {
        match groups.last_mut() {
            Some(group) if range.first <= upper => {
                if range.last > upper {
                    upper.clone_from(&range.last);
                }
                group.push(range);
            }
            _ => {
                upper.clone_from(&range.last);
                groups.push(vec![range]);
            }
        }
    }
    groups
}

/// Sorts by key and keeps, for each key, the entry with the highest sequence.
fn newest_per_key(mut entries: Vec<TableEntry>) -> Vec<TableEntry> {
    entries.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then(a.value.sequence.cmp(&b.value.sequence))
    });
    let mut out: Vec<TableEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match out.last_mut() {
            Some(last) if last.key == entry.key => *last = entry,
            _ => out.push(entry),
        }
    }
    out
}
