//! Table construction.

use super::{encode_index, BlockHandle, Footer, SSTableHandle, TableEntry, BLOCK_SIZE};
use crate::bloom::BloomFilter;
use crate::error::{CoreError, CoreResult};
use bytes::BufMut;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// Accumulates entries into blocks and writes the finished table.
struct TableBuilder<W: Write> {
    out: W,
    block: Vec<u8>,
    block_first_key: Option<Vec<u8>>,
    blocks: Vec<BlockHandle>,
    bloom: BloomFilter,
    offset: u64,
}

impl<W: Write> TableBuilder<W> {
    fn new(out: W, expected_entries: usize) -> Self {
        Self {
            out,
            block: Vec::with_capacity(BLOCK_SIZE),
            block_first_key: None,
            blocks: Vec::new(),
            bloom: BloomFilter::for_entries(expected_entries),
            offset: 0,
        }
    }

    fn add(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        let key_len =
            u32::try_from(key.len()).map_err(|_| CoreError::invalid_format("key too large"))?;
        let value_len =
            u32::try_from(value.len()).map_err(|_| CoreError::invalid_format("value too large"))?;

        self.bloom.insert(key);

        let entry_len = 8 + key.len() + value.len();
        if !self.block.is_empty() && self.block.len() + entry_len > BLOCK_SIZE {
            self.finish_block()?;
        }
        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_vec());
        }

        self.block.put_u32_le(key_len);
        self.block.put_slice(key);
        self.block.put_u32_le(value_len);
        self.block.put_slice(value);
        Ok(())
    }

    fn finish_block(&mut self) -> CoreResult<()> {
        let Some(first_key) = self.block_first_key.take() else {
            return Ok(());
        };
        self.out.write_all(&self.block)?;
        let length = self.block.len() as u64;
        self.blocks.push(BlockHandle {
            first_key,
            offset: self.offset,
            length,
        });
        self.offset += length;
        self.block.clear();
        Ok(())
    }

    fn finish(mut self) -> CoreResult<W> {
        self.finish_block()?;

        let index = encode_index(&self.blocks)?;
        let index_offset = self.offset;
        self.out.write_all(&index)?;
        self.offset += index.len() as u64;

        let bloom = self.bloom.encode();
        let bloom_offset = self.offset;
        self.out.write_all(&bloom)?;

        let footer = Footer {
            index_offset,
            index_size: index.len() as u64,
            bloom_offset,
            bloom_size: bloom.len() as u64,
        };
        self.out.write_all(&footer.encode())?;
        Ok(self.out)
    }
}

/// Writes `entries` to a new table at `path` and fsyncs it.
///
/// Entries must be sorted by key; equal keys may repeat.
pub(crate) fn create(id: Uuid, path: &Path, entries: &[TableEntry]) -> CoreResult<SSTableHandle> {
    debug_assert!(
        entries.windows(2).all(|w| w[0].key <= w[1].key),
        "table entries must be sorted by key"
    );

    let file = File::create(path)?;
    let mut builder = TableBuilder::new(BufWriter::new(file), entries.len());
    for entry in entries {
        builder.add(&entry.key, &entry.value.encode())?;
    }
    let file = builder
        .finish()?
        .into_inner()
        .map_err(|e| CoreError::Io(e.into_error()))?;
    file.sync_all()?;

    tracing::debug!(path = %path.display(), entries = entries.len(), "created table");
    Ok(SSTableHandle::new(id, path))
}
