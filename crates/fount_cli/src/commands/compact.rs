//! Compact command implementation.

use super::{format_size, require_store, CliResult};
use fount_core::{Compactor, Config, ManifestStore, Store, StoreDir};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the compact command.
pub fn run(path: &Path, flush: bool, dry_run: bool) -> CliResult<()> {
    require_store(path)?;
    info!("Compacting store at {:?}", path);
    println!("Compacting tables at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    if dry_run {
        return plan(path);
    }

    let store = Store::open(
        path,
        Config::default()
            .create_if_missing(false)
            .background_compaction(false),
    )?;
    if flush {
        let pending = store.pending_entries();
        store.flush()?;
        println!("Flushed {pending} buffered entries");
    }
    let before = store.tables()?.len();
    let report = store.compact()?;
    let after = store.tables()?.len();
    store.close()?;

    if report.groups_merged == 0 {
        println!("No overlapping tables - nothing to compact");
    } else {
        println!("Compaction complete:");
        println!("  Groups merged: {}", report.groups_merged);
        println!("  Tables:        {before} -> {after}");
        println!(
            "  Entries:       {} -> {}",
            report.entries_in, report.entries_out
        );
    }
    Ok(())
}

fn plan(path: &Path) -> CliResult<()> {
    let dir = Arc::new(StoreDir::open(path, false)?);
    let manifest = Arc::new(ManifestStore::new(dir.manifest_path()));
    let compactor = Compactor::new(Arc::clone(&dir), manifest);

    let groups = compactor.plan()?;
    let merging: Vec<_> = groups.iter().filter(|g| g.len() > 1).collect();
    println!("Compaction plan:");
    println!("  Live tables:     {}", groups.iter().map(Vec::len).sum::<usize>());
    println!("  Groups to merge: {}", merging.len());
    for (n, group) in merging.iter().enumerate() {
        let bytes: u64 = group
            .iter()
            .filter_map(|range| std::fs::metadata(&range.handle.path).ok())
            .map(|meta| meta.len())
            .sum();
        println!("  Group {}: {} tables, {}", n + 1, group.len(), format_size(bytes));
        for range in group.iter() {
            println!("    {}", range.id);
        }
    }
    Ok(())
}
