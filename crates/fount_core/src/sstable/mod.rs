//! Immutable sorted tables.
//!
//! ## File layout
//!
//! ```text
//! [data blocks][block index][bloom filter][footer]
//! ```
//!
//! - data blocks: target 4 KiB, never split an entry; each entry is
//!   `keyLen(4B LE) key valueLen(4B LE) value`
//! - block index: `blockCount(4B LE)` then per block
//!   `keyLen(4B LE) firstKey offset(8B LE) length(8B LE)`
//! - bloom filter: see [`crate::bloom::BloomFilter::encode`]
//! - footer: `indexOffset indexSize bloomOffset bloomSize`, 8B LE each
//!
//! Every value is a [`TableValue`]: the WAL sequence and a tombstone flag in
//! front of the document bytes, so merges can keep the newest write and
//! recovery can rebuild deletes.

mod reader;
mod writer;

pub use reader::{SSTable, TableStats};

use crate::error::{CoreError, CoreResult};
use bytes::{Buf, BufMut};
use std::path::PathBuf;
use uuid::Uuid;

/// Target data block size.
pub const BLOCK_SIZE: usize = 4 * 1024;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 32;

/// Reference to a table file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SSTableHandle {
    /// Table id, also the manifest key.
    pub id: Uuid,
    /// Path of the table file.
    pub path: PathBuf,
}

impl SSTableHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: Uuid, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// A value as stored in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableValue {
    /// Sequence of the write that produced this value.
    pub sequence: u64,
    /// Document bytes, or `None` for a delete.
    pub value: Option<Vec<u8>>,
}

impl TableValue {
    /// Encodes as `sequence(8B LE) flag(1B) value`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body = self.value.as_deref().unwrap_or_default();
        let mut buf = Vec::with_capacity(9 + body.len());
        buf.put_u64_le(self.sequence);
        buf.put_u8(u8::from(self.value.is_some()));
        buf.put_slice(body);
        buf
    }

    /// Decodes a stored value.
    pub fn decode(mut data: &[u8]) -> CoreResult<Self> {
        if data.len() < 9 {
            return Err(CoreError::sstable_corrupt("table value too short"));
        }
        let sequence = data.get_u64_le();
        let value = match data.get_u8() {
            0 if data.is_empty() => None,
            0 => return Err(CoreError::sstable_corrupt("tombstone carries a value")),
            1 => Some(data.to_vec()),
            flag => {
                return Err(CoreError::sstable_corrupt(format!(
                    "unknown table value flag {flag}"
                )))
            }
        };
        Ok(Self { sequence, value })
    }
}

/// A key and its stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Store key.
    pub key: Vec<u8>,
    /// Stored value.
    pub value: TableValue,
}

impl TableEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: Vec<u8>, sequence: u64, value: Option<Vec<u8>>) -> Self {
        Self {
            key,
            value: TableValue { sequence, value },
        }
    }
}

/// Location of a data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockHandle {
    pub first_key: Vec<u8>,
    pub offset: u64,
    pub length: u64,
}

/// Locations of the index and filter sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index_offset: u64,
    pub index_size: u64,
    pub bloom_offset: u64,
    pub bloom_size: u64,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut out = [0u8; FOOTER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.index_offset);
        buf.put_u64_le(self.index_size);
        buf.put_u64_le(self.bloom_offset);
        buf.put_u64_le(self.bloom_size);
        out
    }

    pub fn decode(mut data: &[u8]) -> CoreResult<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(CoreError::sstable_corrupt("footer has wrong size"));
        }
        Ok(Self {
            index_offset: data.get_u64_le(),
            index_size: data.get_u64_le(),
            bloom_offset: data.get_u64_le(),
            bloom_size: data.get_u64_le(),
        })
    }
}

/// Encodes the block index.
pub(crate) fn encode_index(blocks: &[BlockHandle]) -> CoreResult<Vec<u8>> {
    let count = u32::try_from(blocks.len())
        .map_err(|_| CoreError::invalid_format("too many blocks"))?;
    let mut buf = Vec::new();
    buf.put_u32_le(count);
    for block in blocks {
        let key_len = u32::try_from(block.first_key.len())
            .map_err(|_| CoreError::invalid_format("block key too large"))?;
        buf.put_u32_le(key_len);
        buf.put_slice(&block.first_key);
        buf.put_u64_le(block.offset);
        buf.put_u64_le(block.length);
    }
    Ok(buf)
}

/// Decodes the block index.
pub(crate) fn decode_index(mut data: &[u8]) -> CoreResult<Vec<BlockHandle>> {
    if data.remaining() < 4 {
        return Err(CoreError::sstable_corrupt("block index too short"));
    }
    let count = data.get_u32_le() as usize;
    let mut blocks = Vec::with_capacity(count.min(data.remaining() / 20));
    for _ in 0..count {
        if data.remaining() < 4 {
            return Err(CoreError::sstable_corrupt("block index truncated"));
        }
        let key_len = data.get_u32_le() as usize;
        if data.remaining() < key_len + 16 {
            return Err(CoreError::sstable_corrupt("block index entry truncated"));
        }
        let first_key = data[..key_len].to_vec();
        data.advance(key_len);
        blocks.push(BlockHandle {
            first_key,
            offset: data.get_u64_le(),
            length: data.get_u64_le(),
        });
    }
    Ok(blocks)
}

/// Decodes every entry in a run of data blocks.
pub(crate) fn decode_entries(mut data: &[u8]) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = Vec::new();
    while data.has_remaining() {
        let key = take_prefixed(&mut data, "entry key")?;
        let value = take_prefixed(&mut data, "entry value")?;
        entries.push((key, value));
    }
    Ok(entries)
}

fn take_prefixed(data: &mut &[u8], what: &str) -> CoreResult<Vec<u8>> {
    if data.remaining() < 4 {
        return Err(CoreError::sstable_corrupt(format!("{what} length truncated")));
    }
    let len = data.get_u32_le() as usize;
    if data.remaining() < len {
        return Err(CoreError::sstable_corrupt(format!("{what} truncated")));
    }
    let out = data[..len].to_vec();
    data.advance(len);
    Ok(out)
}
