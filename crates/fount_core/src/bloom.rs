//! Bloom filter for fast negative lookups.
//!
//! - If any probed bit is 0, the key is definitely not in the set
//! - If all probed bits are 1, the key is probably in the set
//!
//! Probe `i` hashes the key with FNV-1a whose offset basis is shifted by `i`,
//! so the bit positions are stable across processes and platforms.

use crate::error::{CoreError, CoreResult};

const FNV_OFFSET: u64 = 1_469_598_103_934_665_603;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// Bits allocated per expected key when sizing a filter for a table.
pub const BITS_PER_KEY: usize = 10;

/// Number of probes used for table filters.
pub const TABLE_HASHES: usize = 3;

/// A fixed-size bit array probed by `k` hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    words: Vec<u64>,
    hashes: usize,
    bit_count: usize,
}

impl BloomFilter {
    /// Creates an empty filter of roughly `bit_count` bits using `hashes` probes.
    ///
    /// The bit array holds `bit_count` rounded up to whole words, at least one.
    #[must_use]
    pub fn new(bit_count: usize, hashes: usize) -> Self {
        Self {
            words: vec![0; bit_count.div_ceil(64).max(1)],
            hashes: hashes.max(1),
            bit_count,
        }
    }

    /// Creates a filter sized for a table of `entries` keys.
    #[must_use]
    pub fn for_entries(entries: usize) -> Self {
        Self::new((entries * BITS_PER_KEY).max(64), TABLE_HASHES)
    }

    /// Adds a key.
    pub fn insert(&mut self, key: &[u8]) {
        for i in 0..self.hashes {
            let bit = self.position(key, i);
            self.words[bit / 64] |= 1 << (bit % 64);
        }
    }

    /// Returns false if the key was definitely never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        (0..self.hashes).all(|i| {
            let bit = self.position(key, i);
            self.words[bit / 64] & (1 << (bit % 64)) != 0
        })
    }

    /// Returns the number of probes.
    #[must_use]
    pub fn hashes(&self) -> usize {
        self.hashes
    }

    /// Returns the bit count the filter was sized for.
    #[must_use]
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Encodes as `k(8B LE) bitCount(8B LE) words(8B LE each)`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.words.len() * 8);
        buf.extend_from_slice(&(self.hashes as u64).to_le_bytes());
        buf.extend_from_slice(&(self.bit_count as u64).to_le_bytes());
        for word in &self.words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Decodes a filter written by [`BloomFilter::encode`].
    ///
    /// The probe modulus is derived from the stored words, not the recorded
    /// bit count.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 16 || (data.len() - 16) % 8 != 0 {
            return Err(CoreError::sstable_corrupt(format!(
                "bloom filter has invalid length {}",
                data.len()
            )));
        }
        let hashes = read_u64(&data[0..8]) as usize;
        let bit_count = read_u64(&data[8..16]) as usize;
        let words: Vec<u64> = data[16..].chunks_exact(8).map(read_u64).collect();
        if words.is_empty() || hashes == 0 {
            return Err(CoreError::sstable_corrupt("bloom filter is empty"));
        }
        Ok(Self {
            words,
            hashes,
            bit_count,
        })
    }

    fn position(&self, key: &[u8], probe: usize) -> usize {
        let mut h = FNV_OFFSET.wrapping_add(probe as u64);
        for &b in key {
            h = (h ^ u64::from(b)).wrapping_mul(FNV_PRIME);
        }
        (h % (self.words.len() as u64 * 64)) as usize
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
