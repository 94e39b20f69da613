//! Document and id traits.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use uuid::Uuid;

/// An identifier whose byte encoding preserves its ordering.
///
/// Scans return documents ordered by these bytes, so implementations must
/// produce bytes that compare lexicographically the way the ids compare.
pub trait DocumentId: Clone + Debug + Send + Sync + 'static {
    /// Encodes the id.
    fn to_key_bytes(&self) -> Vec<u8>;

    /// Decodes an id written by [`DocumentId::to_key_bytes`].
    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self>;
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> CoreResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| CoreError::codec(format!("expected {N} bytes for {what}, got {}", bytes.len())))
}

impl DocumentId for u64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(u64::from_be_bytes(fixed(bytes, "u64")?))
    }
}

impl DocumentId for u32 {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(u32::from_be_bytes(fixed(bytes, "u32")?))
    }
}

/// Sign bit flipped so negative ids sort before positive ones.
impl DocumentId for i64 {
    fn to_key_bytes(&self) -> Vec<u8> {
        ((*self as u64) ^ (1 << 63)).to_be_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok((u64::from_be_bytes(fixed(bytes, "i64")?) ^ (1 << 63)) as i64)
    }
}

impl DocumentId for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| CoreError::codec("id is not valid UTF-8"))
    }
}

impl DocumentId for Vec<u8> {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl DocumentId for Uuid {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(Uuid::from_bytes(fixed(bytes, "uuid")?))
    }
}

/// A type that can be stored in a [`crate::Collection`].
///
/// Implementors must provide:
/// - `id()`: the stable identifier
/// - `encode()` / `decode()`: the stored byte form
///
/// # Example
///
/// ```rust,ignore
/// use fount_core::{codec, CoreResult, Document};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Note {
///     id: u64,
///     body: String,
/// }
///
/// impl Document for Note {
///     type Id = u64;
///
///     fn id(&self) -> u64 {
///         self.id
///     }
///
///     fn encode(&self) -> CoreResult<Vec<u8>> {
///         codec::to_cbor(self)
///     }
///
///     fn decode(bytes: &[u8]) -> CoreResult<Self> {
///         codec::from_cbor(bytes)
///     }
/// }
/// ```
pub trait Document: Clone + Send + Sync + 'static {
    /// Identifier type.
    type Id: DocumentId;

    /// Returns the document's identifier.
    ///
    /// This must not change over the document's lifetime.
    fn id(&self) -> Self::Id;

    /// Encodes the document for storage.
    fn encode(&self) -> CoreResult<Vec<u8>>;

    /// Decodes a stored document.
    fn decode(bytes: &[u8]) -> CoreResult<Self>;
}

/// Serializes a value as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(buf)
}

/// Deserializes a CBOR value.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}
