//! Dump WAL command implementation.

use super::{hex, require_store, CliResult};
use crate::Format;
use fount_core::{split_key, wal_path, WalManager, WalPayload, RECORD_OVERHEAD};
use fount_storage::FileLogBackend;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// WAL record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Sequence number.
    pub sequence: u64,
    /// `put`, `delete` or `invalid`.
    pub op: &'static str,
    /// Collection name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Document id bytes, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Value size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

/// Runs the dump-wal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    collection: Option<&str>,
    format: Format,
) -> CliResult<()> {
    require_store(path)?;
    info!("Reading WAL records from {:?}", path);
    let records = read_wal_records(path, limit, collection)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => print_text_output(&records),
    }
    Ok(())
}

/// Reads the valid WAL prefix, optionally filtered by collection.
pub fn read_wal_records(
    path: &Path,
    limit: Option<usize>,
    collection: Option<&str>,
) -> CliResult<Vec<WalRecordInfo>> {
    let wal = wal_path(path);
    if !wal.exists() {
        return Ok(Vec::new());
    }
    let report = WalManager::new(Box::new(FileLogBackend::open(&wal)?)).replay_report()?;

    let mut offset = 0u64;
    let mut records = Vec::new();
    for record in report.records {
        let at = offset;
        offset += (RECORD_OVERHEAD + record.payload.len()) as u64;

        let info = match WalPayload::decode(&record.payload) {
            Ok(payload) => {
                let (name, id) = match split_key(&payload.key) {
                    Some((name, id)) => (Some(name.to_string()), Some(hex(id))),
                    None => (None, Some(hex(&payload.key))),
                };
                WalRecordInfo {
                    offset: at,
                    sequence: record.sequence,
                    op: if payload.value.is_some() { "put" } else { "delete" },
                    collection: name,
                    id,
                    value_size: payload.value.as_ref().map(Vec::len),
                }
            }
            Err(_) => WalRecordInfo {
                offset: at,
                sequence: record.sequence,
                op: "invalid",
                collection: None,
                id: None,
                value_size: None,
            },
        };
        if collection.is_some_and(|wanted| info.collection.as_deref() != Some(wanted)) {
            continue;
        }
        records.push(info);
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
    }
    Ok(records)
}

fn print_text_output(records: &[WalRecordInfo]) {
    println!("WAL Records ({})", records.len());
    println!("===========");
    for r in records {
        let target = match (&r.collection, &r.id) {
            (Some(c), Some(id)) => format!("{c}/{id}"),
            (None, Some(id)) => id.clone(),
            _ => "-".to_string(),
        };
        match r.value_size {
            Some(size) => println!("@{:<8} seq {:<6} {:<7} {target} ({size} bytes)", r.offset, r.sequence, r.op),
            None => println!("@{:<8} seq {:<6} {:<7} {target}", r.offset, r.sequence, r.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fount_core::{codec, Config, CoreResult, Document, Store};
    use serde::Deserialize;

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

    #[test]
    fn records_carry_collection_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), Config::default().background_compaction(false)).unwrap();
            store.collection::<Row>("a").unwrap().put(&Row { id: 1 }).unwrap();
            store.collection::<Row>("b").unwrap().put(&Row { id: 2 }).unwrap();
            store.collection::<Row>("a").unwrap().delete(&1).unwrap();
        }

        let all = read_wal_records(dir.path(), None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].offset, 0);
        assert!(all[1].offset > 0);
        assert_eq!(all[2].op, "delete");
        assert_eq!(all[0].id.as_deref(), Some("0000000000000001"));

        let only_a = read_wal_records(dir.path(), None, Some("a")).unwrap();
        assert_eq!(only_a.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(read_wal_records(dir.path(), Some(1), None).unwrap().len(), 1);
    }
}
