//! # FountDB Core
//!
//! Embedded LSM document store.
//!
//! This crate provides:
//! - A CRC-checked write-ahead log replayed on open
//! - A sorted memtable flushed to immutable SSTables with Bloom filters
//! - A JSON manifest replaced atomically, and a background compactor
//! - Typed, versioned collections with snapshot reads
//! - Unique, multi-value, full-text (BM25) and vector (HNSW) indexes
//!
//! ## Example
//!
//! ```rust,ignore
//! use fount_core::{codec, Config, CoreResult, Document, IndexDefinition, Store};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Note {
//!     id: u64,
//!     tag: String,
//!     body: String,
//! }
//!
//! impl Document for Note {
//!     type Id = u64;
//!     fn id(&self) -> u64 { self.id }
//!     fn encode(&self) -> CoreResult<Vec<u8>> { codec::to_cbor(self) }
//!     fn decode(bytes: &[u8]) -> CoreResult<Self> { codec::from_cbor(bytes) }
//! }
//!
//! let store = Store::open("notes-db", Config::default())?;
//! let notes = store.collection::<Note>("notes")?;
//! notes.define(IndexDefinition::full_text("byBody", |n: &Note| n.body.clone()))?;
//! notes.put(&Note { id: 1, tag: "db".into(), body: "log structured merge".into() })?;
//! let hits = notes.search_text("byBody", "merge", None)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bloom;
mod collection;
mod compaction;
mod config;
mod dir;
mod error;
mod events;
mod fault;
mod index;
mod manifest;
mod memtable;
mod sstable;
mod stats;
mod store;
mod types;
mod wal;

pub use bloom::BloomFilter;
pub use collection::{
    codec, split_key, BatchOp, Collection, Document, DocumentId, IndexDefinition, IndexKind,
    KeyExtractor, VectorExtractor,
};
pub use compaction::{CompactionReport, Compactor, TableRange};
pub use config::Config;
pub use dir::{manifest_path, table_id, wal_path, StoreDir};
pub use error::{CoreError, CoreResult};
pub use events::{EventSink, LogEvent};
pub use fault::{FaultInjector, FaultPoint, NoFaults};
pub use index::{default_analyzer, stopword_analyzer, Analyzer, DistanceMetric, FtsIndex, HnswIndex};
pub use manifest::{Manifest, ManifestStore};
pub use memtable::{FlushCallback, Memtable, MemtableEntry};
pub use sstable::{SSTable, SSTableHandle, TableEntry, TableStats, TableValue};
pub use stats::Metrics;
pub use store::Store;
pub use types::{SequenceNumber, Snapshot};
pub use wal::{ReplayReport, WalManager, WalPayload, WalRecord, RECORD_OVERHEAD};
