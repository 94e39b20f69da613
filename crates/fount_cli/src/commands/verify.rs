//! Verify command implementation.

use super::{hex, require_store, CliError, CliResult};
use fount_core::{
    split_key, table_id, ManifestStore, SSTable, SSTableHandle, StoreDir, TableEntry,
    WalManager, WalPayload,
};
use fount_storage::FileLogBackend;
use std::path::Path;
use tracing::{info, warn};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records or tables checked.
    pub checked: usize,
    /// Number that passed.
    pub valid: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
///
/// Holds the store lock while checking so no writer runs concurrently.
pub fn run(path: &Path, check_wal: bool, check_tables: bool) -> CliResult<()> {
    require_store(path)?;
    let dir = StoreDir::open(path, false)?;
    info!("Verifying store at {:?}", path);
    println!("Verifying store at {}", path.display());
    println!();

    let mut problems = 0;
    if check_wal {
        println!("Checking WAL...");
        let result = verify_wal(&dir)?;
        print_result("WAL", &result);
        problems += result.errors.len();
    }
    if check_tables {
        println!("Checking tables...");
        let result = verify_tables(&dir)?;
        print_result("Tables", &result);
        problems += result.errors.len();
    }

    println!();
    if problems == 0 {
        println!("Store verification passed");
        Ok(())
    } else {
        warn!(problems, "store verification failed");
        println!("Store verification failed");
        Err(CliError::VerificationFailed(problems))
    }
}

/// Checks WAL framing, checksums, payloads and sequence order.
pub fn verify_wal(dir: &StoreDir) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();
    let wal = dir.wal_path();
    if !wal.exists() {
        return Ok(result);
    }

    let report = WalManager::new(Box::new(FileLogBackend::open(&wal)?)).replay_report()?;
    let mut last = 0u64;
    for record in &report.records {
        result.checked += 1;
        if record.sequence <= last {
            result.errors.push(format!(
                "sequence {} follows {} out of order",
                record.sequence, last
            ));
            continue;
        }
        last = record.sequence;
        match WalPayload::decode(&record.payload) {
            Ok(payload) if split_key(&payload.key).is_some() => result.valid += 1,
            Ok(_) => result
                .errors
                .push(format!("record {} has a malformed key", record.sequence)),
            Err(e) => result
                .errors
                .push(format!("record {}: {e}", record.sequence)),
        }
    }
    if report.has_damaged_tail() {
        result.errors.push(format!(
            "{} damaged bytes after offset {}",
            report.total_bytes - report.valid_bytes,
            report.valid_bytes
        ));
    }
    Ok(result)
}

/// Checks that every manifest table decodes and no stray tables exist.
pub fn verify_tables(dir: &StoreDir) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();
    let manifest = ManifestStore::new(dir.manifest_path()).load()?;

    for (id, path) in &manifest.tables {
        result.checked += 1;
        let handle = SSTableHandle::new(*id, path.clone());
        match SSTable::scan(&handle) {
            Ok(entries) => match check_table(&handle, &entries, manifest.sequence) {
                Ok(()) => result.valid += 1,
                Err(problem) => result.errors.push(format!("table {id}: {problem}")),
            },
            Err(e) => result.errors.push(format!("table {id}: {e}")),
        }
    }

    for file in dir.table_files()? {
        if !table_id(&file).is_some_and(|id| manifest.tables.contains_key(&id)) {
            result
                .errors
                .push(format!("unreferenced table file {}", file.display()));
        }
    }
    Ok(result)
}

/// Checks sequences against the manifest and looks every key up again
/// through the Bloom filter and block index.
fn check_table(
    handle: &SSTableHandle,
    entries: &[TableEntry],
    manifest_sequence: u64,
) -> Result<(), String> {
    if let Some(entry) = entries.iter().find(|e| e.value.sequence > manifest_sequence) {
        return Err(format!(
            "holds sequence {} above manifest sequence {manifest_sequence}",
            entry.value.sequence
        ));
    }
    if entries.windows(2).any(|w| w[0].key > w[1].key) {
        return Err("keys out of order".to_string());
    }
    for entry in entries {
        match SSTable::get(handle, &entry.key) {
            Ok(Some(found)) if found.sequence >= entry.value.sequence => {}
            Ok(_) => return Err(format!("lookup misses key {}", hex(&entry.key))),
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(())
}

fn print_result(name: &str, result: &VerifyResult) {
    println!(
        "  {name}: {} checked, {} valid, {} problems",
        result.checked,
        result.valid,
        result.errors.len()
    );
    for error in &result.errors {
        println!("    - {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fount_core::{codec, Config, CoreResult, Document, Store};
    use serde::{Deserialize, Serialize};
    use std::io::Write;

    #[derive(Clone, Serialize, Deserialize)]
    struct Row {
        id: u64,
    }

    impl Document for Row {
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

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Config::default().background_compaction(false)).unwrap();
        let rows = store.collection::<Row>("rows").unwrap();
        for id in 1..=3 {
            rows.put(&Row { id }).unwrap();
        }
        store.flush().unwrap();
        rows.put(&Row { id: 4 }).unwrap();
        dir
    }

    #[test]
    fn healthy_store_passes() {
        let tmp = populated();
        let dir = StoreDir::open(tmp.path(), false).unwrap();
        let wal = verify_wal(&dir).unwrap();
        assert!(wal.is_ok());
        assert_eq!(wal.valid, 4);
        let tables = verify_tables(&dir).unwrap();
        assert!(tables.is_ok());
        assert_eq!(tables.checked, 1);
    }

    #[test]
    fn damaged_tail_and_stray_table_are_reported() {
        let tmp = populated();
        std::fs::OpenOptions::new()
            .append(true)
            .open(fount_core::wal_path(tmp.path()))
            .unwrap()
            .write_all(&[1, 2, 3])
            .unwrap();
        std::fs::write(tmp.path().join("stray.sst"), b"junk").unwrap();

        let dir = StoreDir::open(tmp.path(), false).unwrap();
        assert_eq!(verify_wal(&dir).unwrap().errors.len(), 1);
        assert_eq!(verify_tables(&dir).unwrap().errors.len(), 1);
    }

    #[test]
    fn tables_match_under_another_path_spelling() {
        let tmp = populated();
        let name = tmp.path().file_name().unwrap();
        let alias = tmp.path().join("..").join(name);
        let dir = StoreDir::open(&alias, false).unwrap();
        let tables = verify_tables(&dir).unwrap();
        assert!(tables.is_ok(), "{:?}", tables.errors);
    }

    #[test]
    fn run_fails_on_problems() {
        let tmp = populated();
        std::fs::write(tmp.path().join("stray.sst"), b"junk").unwrap();
        assert!(matches!(
            run(tmp.path(), false, true),
            Err(CliError::VerificationFailed(1))
        ));
    }
}
