//! Table lookups and scans.

use super::{
    decode_entries, decode_index, writer, BlockHandle, Footer, SSTableHandle, TableEntry,
    TableValue, FOOTER_SIZE,
};
use crate::bloom::BloomFilter;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use uuid::Uuid;

/// Summary of a table file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Number of entries, tombstones included.
    pub entries: usize,
    /// Entries that delete their key.
    pub tombstones: usize,
    /// Number of data blocks.
    pub blocks: usize,
    /// File size in bytes.
    pub file_size: u64,
}

/// Operations on immutable table files.
#[derive(Debug, Clone, Copy)]
pub struct SSTable;

impl SSTable {
    /// Writes a new table holding `entries`, sorted by key, under a fresh id.
    pub fn create(path: &Path, entries: &[TableEntry]) -> CoreResult<SSTableHandle> {
        writer::create(Uuid::new_v4(), path, entries)
    }

    /// Writes a new table under a caller-chosen id.
    pub fn create_with_id(
        id: Uuid,
        path: &Path,
        entries: &[TableEntry],
    ) -> CoreResult<SSTableHandle> {
        writer::create(id, path, entries)
    }

    /// Looks up the newest value stored for `key`.
    ///
    /// Consults the Bloom filter first; a negative answer skips the index and
    /// data blocks entirely.
    pub fn get(handle: &SSTableHandle, key: &[u8]) -> CoreResult<Option<TableValue>> {
        let mut file = open(handle)?;
        let size = file.metadata()?.len();
        let footer = read_footer(&mut file, size)?;

        let bloom = BloomFilter::decode(&read_at(
            &mut file,
            size,
            footer.bloom_offset,
            footer.bloom_size,
        )?)?;
        if !bloom.may_contain(key) {
            return Ok(None);
        }

        let blocks = decode_index(&read_at(
            &mut file,
            size,
            footer.index_offset,
            footer.index_size,
        )?)?;
        let start = blocks
            .partition_point(|b| b.first_key.as_slice() < key)
            .saturating_sub(1);

        let mut best: Option<TableValue> = None;
        for block in blocks[start..]
            .iter()
            .take_while(|b| b.first_key.as_slice() <= key)
        {
            let data = read_block(&mut file, size, block)?;
            for (k, v) in decode_entries(&data)? {
                if k != key {
                    continue;
                }
                let value = TableValue::decode(&v)?;
                if best.as_ref().map_or(true, |b| value.sequence >= b.sequence) {
                    best = Some(value);
                }
            }
        }
        Ok(best)
    }

    /// Returns every entry in file order.
    pub fn scan(handle: &SSTableHandle) -> CoreResult<Vec<TableEntry>> {
        let data = read_file(handle)?;
        let footer = footer_of(&data)?;
        let end = usize::try_from(footer.index_offset)
            .ok()
            .filter(|&end| end <= data.len() - FOOTER_SIZE)
            .ok_or_else(|| CoreError::sstable_corrupt("index offset out of bounds"))?;
        decode_entries(&data[..end])?
            .into_iter()
            .map(|(key, value)| {
                Ok(TableEntry {
                    key,
                    value: TableValue::decode(&value)?,
                })
            })
            .collect()
    }

    /// Returns the first and last key, or `None` for an empty table.
    pub fn key_range(handle: &SSTableHandle) -> CoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        let entries = Self::scan(handle)?;
        Ok(match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => Some((first.key.clone(), last.key.clone())),
            _ => None,
        })
    }

    /// Reads summary statistics.
    pub fn stats(handle: &SSTableHandle) -> CoreResult<TableStats> {
        let data = read_file(handle)?;
        let footer = footer_of(&data)?;
        let index = slice(&data, footer.index_offset, footer.index_size)?;
        let blocks = decode_index(index)?.len();
        let entries = Self::scan(handle)?;
        Ok(TableStats {
            entries: entries.len(),
            tombstones: entries.iter().filter(|e| e.value.value.is_none()).count(),
            blocks,
            file_size: data.len() as u64,
        })
    }
}

fn open(handle: &SSTableHandle) -> CoreResult<File> {
    File::open(&handle.path).map_err(|e| not_found_or_io(handle, e))
}

fn read_file(handle: &SSTableHandle) -> CoreResult<Vec<u8>> {
    fs::read(&handle.path).map_err(|e| not_found_or_io(handle, e))
}

fn not_found_or_io(handle: &SSTableHandle, err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::NotFound {
        CoreError::SSTableNotFound {
            path: handle.path.display().to_string(),
        }
    } else {
        CoreError::Io(err)
    }
}

fn footer_of(data: &[u8]) -> CoreResult<Footer> {
    if data.len() < FOOTER_SIZE {
        return Err(CoreError::sstable_corrupt("file too short for footer"));
    }
    Footer::decode(&data[data.len() - FOOTER_SIZE..])
}

fn read_footer(file: &mut File, size: u64) -> CoreResult<Footer> {
    if size < FOOTER_SIZE as u64 {
        return Err(CoreError::sstable_corrupt("file too short for footer"));
    }
    Footer::decode(&read_at(file, size, size - FOOTER_SIZE as u64, FOOTER_SIZE as u64)?)
}

fn read_block(file: &mut File, size: u64, block: &BlockHandle) -> CoreResult<Vec<u8>> {
    read_at(file, size, block.offset, block.length)
}

fn read_at(file: &mut File, size: u64, offset: u64, len: u64) -> CoreResult<Vec<u8>> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= size)
        .ok_or_else(|| CoreError::sstable_corrupt("section out of bounds"))?;
    let len = usize::try_from(end - offset)
        .map_err(|_| CoreError::sstable_corrupt("section too large"))?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn slice(data: &[u8], offset: u64, len: u64) -> CoreResult<&[u8]> {
    let start = usize::try_from(offset).ok();
    let end = offset.checked_add(len).and_then(|e| usize::try_from(e).ok());
    match (start, end) {
        (Some(start), Some(end)) if end <= data.len() => Ok(&data[start..end]),
        _ => Err(CoreError::sstable_corrupt("section out of bounds")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(key: &str, seq: u64, value: Option<&str>) -> TableEntry {
        TableEntry::new(
            key.as_bytes().to_vec(),
            seq,
            value.map(|v| v.as_bytes().to_vec()),
        )
    }

    #[test]
    fn create_get_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.sst");
        let entries = vec![
            entry("apple", 1, Some("red")),
            entry("banana", 2, Some("yellow")),
            entry("cherry", 3, None),
        ];
        let handle = SSTable::create(&path, &entries).unwrap();
        assert_eq!(handle.path, path);

        let got = SSTable::get(&handle, b"banana").unwrap().unwrap();
        assert_eq!(got.sequence, 2);
        assert_eq!(got.value.as_deref(), Some(&b"yellow"[..]));

        let tomb = SSTable::get(&handle, b"cherry").unwrap().unwrap();
        assert!(tomb.value.is_none());

        assert!(SSTable::get(&handle, b"durian").unwrap().is_none());
        assert!(SSTable::get(&handle, b"a").unwrap().is_none());
        assert_eq!(SSTable::scan(&handle).unwrap(), entries);
    }

    #[test]
    fn empty_table() {
        let dir = tempdir().unwrap();
        let handle = SSTable::create(&dir.path().join("e.sst"), &[]).unwrap();
        assert!(SSTable::scan(&handle).unwrap().is_empty());
        assert!(SSTable::get(&handle, b"x").unwrap().is_none());
        assert!(SSTable::key_range(&handle).unwrap().is_none());
    }

    #[test]
    fn many_blocks_every_key_found() {
        let dir = tempdir().unwrap();
        let entries: Vec<_> = (0..2000u32)
            .map(|i| {
                TableEntry::new(
                    format!("key-{i:06}").into_bytes(),
                    u64::from(i),
                    Some(vec![b'v'; 40]),
                )
            })
            .collect();
        let handle = SSTable::create(&dir.path().join("big.sst"), &entries).unwrap();

        let stats = SSTable::stats(&handle).unwrap();
        assert_eq!(stats.entries, 2000);
        assert!(stats.blocks > 1);

        for i in (0..2000u32).step_by(37) {
            let key = format!("key-{i:06}");
            let got = SSTable::get(&handle, key.as_bytes()).unwrap().unwrap();
            assert_eq!(got.sequence, u64::from(i));
        }
        assert_eq!(
            SSTable::key_range(&handle).unwrap(),
            Some((b"key-000000".to_vec(), b"key-001999".to_vec()))
        );
    }

    #[test]
    fn duplicate_keys_newest_sequence_wins() {
        let dir = tempdir().unwrap();
        let mut entries = Vec::new();
        // enough duplicates to spill across block boundaries
        for seq in 1..=200u64 {
            entries.push(TableEntry::new(b"dup".to_vec(), seq, Some(vec![0; 50])));
        }
        entries.push(entry("zzz", 500, Some("z")));
        let handle = SSTable::create(&dir.path().join("d.sst"), &entries).unwrap();

        assert!(SSTable::stats(&handle).unwrap().blocks > 1);
        let got = SSTable::get(&handle, b"dup").unwrap().unwrap();
        assert_eq!(got.sequence, 200);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let handle = SSTableHandle::new(Uuid::new_v4(), dir.path().join("gone.sst"));
        assert!(matches!(
            SSTable::get(&handle, b"k"),
            Err(CoreError::SSTableNotFound { .. })
        ));
        assert!(matches!(
            SSTable::scan(&handle),
            Err(CoreError::SSTableNotFound { .. })
        ));
    }

    #[test]
    fn damaged_footer_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.sst");
        let handle = SSTable::create(&path, &[entry("k", 1, Some("v"))]).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let n = bytes.len();
        bytes[n - 32..n - 24].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            SSTable::scan(&handle),
            Err(CoreError::SSTableCorrupt { .. })
        ));

        fs::write(&path, b"short").unwrap();
        assert!(matches!(
            SSTable::get(&handle, b"k"),
            Err(CoreError::SSTableCorrupt { .. })
        ));
    }
}
