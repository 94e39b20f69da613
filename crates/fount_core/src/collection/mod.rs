//! Typed, versioned document collections.
//!
//! A collection keeps, per document id, the full list of versions written
//! to it. Secondary indexes are maintained alongside:
//!
//! - **unique**: one owner per key, versioned
//! - **multi**: a set of ids per key, versioned
//! - **full-text**: BM25 over analyzer tokens, latest versions only
//! - **vector**: approximate nearest neighbours, latest versions only
//!
//! Storage keys are `collection name || 0x00 || id key bytes`.

pub mod codec;
mod index;
mod state;
mod typed;
mod versions;

pub use codec::{Document, DocumentId};
pub use index::{IndexDefinition, IndexKind, KeyExtractor, VectorExtractor};
pub use typed::{BatchOp, Collection};

pub(crate) use typed::CollectionShared;

/// A record read from disk at open, waiting for its collection.
#[derive(Debug, Clone)]
pub(crate) struct StagedRecord {
    pub id: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub sequence: u64,
}

/// Builds the storage key for a document.
pub(crate) fn store_key(collection: &str, id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + 1 + id.len());
    key.extend_from_slice(collection.as_bytes());
    key.push(0);
    key.extend_from_slice(id);
    key
}

/// Splits a storage key into collection name and id bytes.
///
/// Returns `None` for keys without a separator or with a non-UTF-8 name.
pub fn split_key(key: &[u8]) -> Option<(&str, &[u8])> {
    let sep = key.iter().position(|b| *b == 0)?;
    let name = std::str::from_utf8(&key[..sep]).ok()?;
    Some((name, &key[sep + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip() {
        let key = store_key("notes", &[0, 1, 2]);
        assert_eq!(key, b"notes\0\0\x01\x02");
        assert_eq!(split_key(&key), Some(("notes", &[0u8, 1, 2][..])));
    }

    #[test]
    fn split_rejects_bad_keys() {
        assert_eq!(split_key(b"no-separator"), None);
        assert_eq!(split_key(&[0xff, 0xfe, 0x00, 0x01]), None);
        assert_eq!(split_key(b"\0id"), Some(("", &b"id"[..])));
    }
}
