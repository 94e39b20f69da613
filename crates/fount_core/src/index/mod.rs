//! Search structures backing the text and vector index kinds.
//!
//! - [`FtsIndex`]: inverted index with BM25 ranking
//! - [`HnswIndex`]: deterministic hierarchical navigable small world graph
//!
//! Both key documents by an opaque string label. Collections derive labels
//! from document id bytes and keep the reverse mapping themselves.

mod fts;
mod hnsw;

pub use fts::{default_analyzer, stopword_analyzer, Analyzer, FtsIndex};
pub use hnsw::{DistanceMetric, HnswIndex};
