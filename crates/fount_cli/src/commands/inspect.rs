//! Inspect command implementation.

use super::{format_size, hex, require_store, CliResult};
use crate::Format;
use fount_core::{
    manifest_path, split_key, wal_path, ManifestStore, SSTable, SSTableHandle, TableStats,
    WalManager, WalPayload,
};
use fount_storage::FileLogBackend;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Store inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Sequence recorded in the manifest.
    pub manifest_sequence: u64,
    /// Number of live tables.
    pub table_count: usize,
    /// Entries across all tables, tombstones included.
    pub table_entries: usize,
    /// Tombstones across all tables.
    pub table_tombstones: usize,
    /// Total table bytes.
    pub table_bytes: u64,
    /// WAL size in bytes.
    pub wal_bytes: u64,
    /// Records in the valid WAL prefix.
    pub wal_records: usize,
    /// Highest sequence in the WAL.
    pub wal_max_sequence: u64,
    /// Bytes after the valid WAL prefix.
    pub wal_damaged_bytes: u64,
    /// WAL records per collection.
    pub wal_collections: BTreeMap<String, usize>,
    /// Per-table details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableInfo>>,
}

/// Details for one table.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Table id.
    pub id: String,
    /// File name.
    pub file: String,
    /// Smallest key, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_key: Option<String>,
    /// Largest key, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_key: Option<String>,
    /// Table statistics.
    #[serde(flatten)]
    pub stats: TableStats,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_tables: bool, format: Format) -> CliResult<()> {
    let result = inspect(path, show_tables)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects statistics without taking the store lock.
pub fn inspect(path: &Path, show_tables: bool) -> CliResult<InspectResult> {
    info!("Inspecting store at {:?}", path);
    require_store(path)?;
    let mut result = InspectResult {
        path: path.display().to_string(),
        ..InspectResult::default()
    };

    let manifest = ManifestStore::new(manifest_path(path)).load()?;
    result.manifest_sequence = manifest.sequence;
    result.table_count = manifest.tables.len();
    let mut tables = Vec::with_capacity(manifest.tables.len());
    for (id, table_path) in &manifest.tables {
        let handle = SSTableHandle::new(*id, table_path.clone());
        let stats = SSTable::stats(&handle)?;
        let range = SSTable::key_range(&handle)?;
        result.table_entries += stats.entries;
        result.table_tombstones += stats.tombstones;
        result.table_bytes += stats.file_size;
        tables.push(TableInfo {
            id: id.to_string(),
            file: table_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            first_key: range.as_ref().map(|(first, _)| hex(first)),
            last_key: range.as_ref().map(|(_, last)| hex(last)),
            stats,
        });
    }
    if show_tables {
        result.tables = Some(tables);
    }

    let wal = wal_path(path);
    if wal.exists() {
        let report = WalManager::new(Box::new(FileLogBackend::open(&wal)?)).replay_report()?;
        result.wal_bytes = report.total_bytes;
        result.wal_damaged_bytes = report.total_bytes - report.valid_bytes;
        result.wal_records = report.records.len();
        for record in &report.records {
            result.wal_max_sequence = result.wal_max_sequence.max(record.sequence);
            let collection = WalPayload::decode(&record.payload)
                .ok()
                .and_then(|payload| split_key(&payload.key).map(|(name, _)| name.to_string()))
                .unwrap_or_else(|| "<undecodable>".to_string());
            *result.wal_collections.entry(collection).or_insert(0) += 1;
        }
    }

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("FountDB Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Manifest:");
    println!("  Sequence:   {}", result.manifest_sequence);
    println!("  Tables:     {}", result.table_count);
    println!("  Entries:    {}", result.table_entries);
    println!("  Tombstones: {}", result.table_tombstones);
    println!("  Size:       {}", format_size(result.table_bytes));
    println!();
    println!("WAL:");
    println!("  Size:         {}", format_size(result.wal_bytes));
    println!("  Records:      {}", result.wal_records);
    println!("  Max sequence: {}", result.wal_max_sequence);
    if result.wal_damaged_bytes > 0 {
        println!(
            "  Damaged tail: {} (dropped on next open)",
            format_size(result.wal_damaged_bytes)
        );
    }
    for (name, count) in &result.wal_collections {
        println!("  [{name}] {count} records");
    }

    if let Some(tables) = &result.tables {
        println!();
        println!("Tables:");
        for table in tables {
            println!(
                "  {} {} entries ({} tombstones), {} blocks, {}",
                table.file,
                table.stats.entries,
                table.stats.tombstones,
                table.stats.blocks,
                format_size(table.stats.file_size)
            );
            if let (Some(first), Some(last)) = (&table.first_key, &table.last_key) {
                println!("    keys {first} .. {last}");
            }
        }
    }
}
