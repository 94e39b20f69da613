//! WAL record framing and payload encoding.

use crate::error::{CoreError, CoreResult};

/// Header bytes before the payload: sequence (8) + length (4).
const HEADER_SIZE: usize = 12;

/// Trailing checksum bytes.
const CRC_SIZE: usize = 4;

/// Fixed framing bytes around every payload.
pub const RECORD_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

const FLAG_TOMBSTONE: u8 = 0;
const FLAG_VALUE: u8 = 1;

/// A single WAL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Sequence number of the mutation.
    pub sequence: u64,
    /// Encoded [`WalPayload`].
    pub payload: Vec<u8>,
    /// CRC32 of the payload. Zero on append means "compute it".
    pub crc32: u32,
}

impl WalRecord {
    /// Creates a record whose checksum will be computed on append.
    #[must_use]
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            payload,
            crc32: 0,
        }
    }

    /// Creates a record carrying a precomputed checksum.
    #[must_use]
    pub fn with_checksum(sequence: u64, payload: Vec<u8>) -> Self {
        let crc32 = crc32fast::hash(&payload);
        Self {
            sequence,
            payload,
            crc32,
        }
    }

    /// Frames the record for the log, validating any supplied checksum.
    pub(crate) fn frame(&self) -> CoreResult<Vec<u8>> {
        let actual = crc32fast::hash(&self.payload);
        if self.crc32 != 0 && self.crc32 != actual {
            return Err(CoreError::WalCrcMismatch {
                expected: self.crc32,
                actual,
            });
        }
        let len = u32::try_from(self.payload.len())
            .map_err(|_| CoreError::invalid_format("WAL record payload too large"))?;

        let mut data = Vec::with_capacity(RECORD_OVERHEAD + self.payload.len());
        data.extend_from_slice(&self.sequence.to_be_bytes());
        data.extend_from_slice(&len.to_be_bytes());
        data.extend_from_slice(&self.payload);
        data.extend_from_slice(&actual.to_be_bytes());
        Ok(data)
    }

    /// Decodes the record starting at `offset`.
    ///
    /// Returns `None` when the bytes at `offset` do not hold a complete record
    /// with a matching checksum.
    pub(crate) fn unframe(data: &[u8], offset: usize) -> Option<(Self, usize)> {
        let rest = data.get(offset..)?;
        if rest.len() < RECORD_OVERHEAD {
            return None;
        }
        let sequence = u64::from_be_bytes(rest[0..8].try_into().ok()?);
        let len = u32::from_be_bytes(rest[8..12].try_into().ok()?) as usize;
        let end = HEADER_SIZE.checked_add(len)?;
        if end + CRC_SIZE > rest.len() {
            return None;
        }
        let payload = &rest[HEADER_SIZE..end];
        let stored = u32::from_be_bytes(rest[end..end + CRC_SIZE].try_into().ok()?);
        if crc32fast::hash(payload) != stored {
            return None;
        }
        Some((
            Self {
                sequence,
                payload: payload.to_vec(),
                crc32: stored,
            },
            end + CRC_SIZE,
        ))
    }
}

/// The mutation carried by a WAL record: a key and an optional value.
///
/// Encoded as `keyLen(4B BE) key flag(1B) [valueLen(4B BE) value]` where the
/// flag is 0 for a tombstone and 1 for a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalPayload {
    /// Store key (`collection || 0x00 || id bytes`).
    pub key: Vec<u8>,
    /// New value, or `None` for a delete.
    pub value: Option<Vec<u8>>,
}

impl WalPayload {
    /// Encodes the payload.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| CoreError::invalid_format("WAL key too large"))?;
        let mut buf = Vec::with_capacity(
            9 + self.key.len() + self.value.as_ref().map_or(0, Vec::len),
        );
        buf.extend_from_slice(&key_len.to_be_bytes());
        buf.extend_from_slice(&self.key);
        match &self.value {
            Some(value) => {
                let value_len = u32::try_from(value.len())
                    .map_err(|_| CoreError::invalid_format("WAL value too large"))?;
                buf.push(FLAG_VALUE);
                buf.extend_from_slice(&value_len.to_be_bytes());
                buf.extend_from_slice(value);
            }
            None => buf.push(FLAG_TOMBSTONE),
        }
        Ok(buf)
    }

    /// Decodes a payload.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let short = || CoreError::invalid_format("WAL payload too short");
        let key_len = u32::from_be_bytes(
            data.get(0..4).ok_or_else(short)?.try_into().map_err(|_| short())?,
        ) as usize;
        let key_end = 4usize.checked_add(key_len).ok_or_else(short)?;
        let key = data.get(4..key_end).ok_or_else(short)?.to_vec();
        let flag = *data.get(key_end).ok_or_else(short)?;
        let value = match flag {
            FLAG_TOMBSTONE => None,
            FLAG_VALUE => {
                let len_start = key_end + 1;
                let value_len = u32::from_be_bytes(
                    data.get(len_start..len_start + 4)
                        .ok_or_else(short)?
                        .try_into()
                        .map_err(|_| short())?,
                ) as usize;
                let start = len_start + 4;
                let end = start.checked_add(value_len).ok_or_else(short)?;
                Some(data.get(start..end).ok_or_else(short)?.to_vec())
            }
            other => {
                return Err(CoreError::invalid_format(format!(
                    "unknown WAL payload flag {other}"
                )))
            }
        };
        Ok(Self { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let rec = WalRecord::new(7, b"abc".to_vec());
        let framed = rec.frame().unwrap();
        assert_eq!(framed.len(), RECORD_OVERHEAD + 3);
        assert_eq!(&framed[0..8], &7u64.to_be_bytes());
        assert_eq!(&framed[8..12], &3u32.to_be_bytes());
        assert_eq!(&framed[12..15], b"abc");
        assert_eq!(&framed[15..19], &crc32fast::hash(b"abc").to_be_bytes());
    }

    #[test]
    fn frame_rejects_wrong_checksum() {
        let mut rec = WalRecord::new(1, b"payload".to_vec());
        rec.crc32 = 0xDEAD_BEEF;
        assert!(matches!(rec.frame(), Err(CoreError::WalCrcMismatch { .. })));

        let good = WalRecord::with_checksum(1, b"payload".to_vec());
        assert!(good.frame().is_ok());
    }

    #[test]
    fn unframe_stops_on_truncation() {
        let framed = WalRecord::new(1, b"hello".to_vec()).frame().unwrap();
        assert!(WalRecord::unframe(&framed[..framed.len() - 1], 0).is_none());
        assert!(WalRecord::unframe(&framed[..5], 0).is_none());
        let (rec, next) = WalRecord::unframe(&framed, 0).unwrap();
        assert_eq!(rec.sequence, 1);
        assert_eq!(next, framed.len());
    }

    #[test]
    fn payload_value_and_tombstone() {
        let put = WalPayload {
            key: b"notes\0\x01".to_vec(),
            value: Some(b"body".to_vec()),
        };
        assert_eq!(WalPayload::decode(&put.encode().unwrap()).unwrap(), put);

        let del = WalPayload {
            key: b"notes\0\x01".to_vec(),
            value: None,
        };
        let bytes = del.encode().unwrap();
        assert_eq!(bytes.len(), 4 + 7 + 1);
        assert_eq!(WalPayload::decode(&bytes).unwrap(), del);
    }

    #[test]
    fn payload_decode_rejects_garbage() {
        assert!(WalPayload::decode(&[0, 0]).is_err());
        assert!(WalPayload::decode(&[0, 0, 0, 1, b'k', 9]).is_err());
        assert!(WalPayload::decode(&[0, 0, 0, 1, b'k', 1, 0, 0, 0, 5, 1]).is_err());
    }
}
