//! Typed collection handle.

use super::codec::{Document, DocumentId};
use super::index::IndexDefinition;
use super::state::CollectionState;
use super::{store_key, StagedRecord};
use crate::error::{CoreError, CoreResult};
use crate::events::LogEvent;
use crate::index::DistanceMetric;
use crate::store::StoreInner;
use crate::types::Snapshot;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// One operation in a [`Collection::batch`].
#[derive(Debug, Clone)]
pub enum BatchOp<T: Document> {
    /// Insert or replace a document.
    Put(T),
    /// Delete a document by id.
    Delete(T::Id),
}

/// State shared by every handle to one collection.
pub(crate) struct CollectionShared<T: Document> {
    name: String,
    state: Mutex<CollectionState<T>>,
}

impl<T: Document> CollectionShared<T> {
    pub fn new(name: String) -> Self {
        Self {
            name,
            state: Mutex::new(CollectionState::default()),
        }
    }

    /// Replays staged records into an empty collection, oldest first.
    pub fn bootstrap(&self, mut records: Vec<StagedRecord>) {
        records.sort_by_key(|r| r.sequence);
        let mut state = self.state.lock();
        let mut skipped = 0usize;
        for record in records {
            if let Err(e) = T::Id::from_key_bytes(&record.id) {
                tracing::warn!(collection = %self.name, error = %e, "skipping record with undecodable id");
                skipped += 1;
                continue;
            }
            match record.value {
                Some(bytes) => match T::decode(&bytes) {
                    Ok(doc) => state.apply_put(record.id, doc, record.sequence),
                    Err(e) => {
                        tracing::warn!(
                            collection = %self.name,
                            sequence = record.sequence,
                            error = %e,
                            "skipping undecodable document"
                        );
                        skipped += 1;
                    }
                },
                None => state.apply_delete(record.id, record.sequence),
            }
        }
        tracing::debug!(collection = %self.name, documents = state.len(), skipped, "collection bootstrapped");
    }
}

/// A typed collection of documents.
///
/// Every write goes through the store's WAL and memtable before it is applied
/// to the collection's in-memory version chains. Reads never touch disk.
///
/// Handles are cheap to clone; clones share state. Operations on one
/// collection are serialized by its mutex.
///
/// # Example
///
/// ```rust,ignore
/// let notes: Collection<Note> = store.collection("notes")?;
/// notes.define(IndexDefinition::multi("byTag", |n: &Note| n.tag.clone()))?;
///
/// let seq = notes.put(&Note { id: 1, tag: "rust".into(), body: "hello".into() })?;
/// let before = store.snapshot();
/// notes.delete(&1)?;
///
/// assert!(notes.get(&1, None)?.is_none());
/// assert!(notes.get(&1, Some(before))?.is_some());
/// ```
pub struct Collection<T: Document> {
    shared: Arc<CollectionShared<T>>,
    store: Arc<StoreInner>,
}

impl<T: Document> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Document> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(shared: Arc<CollectionShared<T>>, store: Arc<StoreInner>) -> Self {
        Self { shared, store }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn event(&self, make: impl FnOnce(String) -> LogEvent) {
        self.store.emit(make(self.shared.name.clone()));
    }

    fn key(&self, id: &[u8]) -> Vec<u8> {
        store_key(&self.shared.name, id)
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Defines (or redefines) a secondary index, building it from the
    /// latest version of every document.
    pub fn define(&self, definition: IndexDefinition<T>) -> CoreResult<()> {
        tracing::debug!(
            collection = %self.shared.name,
            index = %definition.name,
            kind = definition.kind.name(),
            "defining index"
        );
        self.shared.state.lock().define(definition);
        Ok(())
    }

    /// Removes an index. Returns `false` if it did not exist.
    pub fn drop_index(&self, name: &str) -> bool {
        self.shared.state.lock().drop_index(name)
    }

    /// Names of the defined indexes, sorted.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.shared.state.lock().index_names()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts or replaces a document, returning the sequence it was
    /// written at.
    ///
    /// # Errors
    ///
    /// Returns `UniqueConstraintViolation` before anything is written if a
    /// unique index key is owned by another document.
    pub fn put(&self, doc: &T) -> CoreResult<u64> {
        self.write_put(doc, None)
    }

    /// Inserts or replaces a document at an explicit sequence.
    ///
    /// The store's sequence counter is raised to at least `sequence`.
    pub fn put_at(&self, doc: &T, sequence: u64) -> CoreResult<u64> {
        self.write_put(doc, Some(sequence))
    }

    /// Deletes a document, returning the sequence of the tombstone.
    pub fn delete(&self, id: &T::Id) -> CoreResult<u64> {
        self.write_delete(id, None)
    }

    /// Deletes a document at an explicit sequence.
    pub fn delete_at(&self, id: &T::Id, sequence: u64) -> CoreResult<u64> {
        self.write_delete(id, Some(sequence))
    }

    fn write_put(&self, doc: &T, at: Option<u64>) -> CoreResult<u64> {
        self.store.stats.record_put();
        self.event(|collection| LogEvent::Put { collection });

        let id = doc.id().to_key_bytes();
        let value = doc.encode()?;

        let mut state = self.shared.state.lock();
        state.check_put(&id, doc)?;
        let seq = self.store.commit(vec![(self.key(&id), Some(value))], at)?;
        state.apply_put(id, doc.clone(), seq);
        Ok(seq)
    }

    fn write_delete(&self, id: &T::Id, at: Option<u64>) -> CoreResult<u64> {
        self.store.stats.record_delete();
        self.event(|collection| LogEvent::Delete { collection });

        let id = id.to_key_bytes();
        let mut state = self.shared.state.lock();
        let seq = self.store.commit(vec![(self.key(&id), None)], at)?;
        state.apply_delete(id, seq);
        Ok(seq)
    }

    /// Applies several operations atomically with contiguous sequences.
    ///
    /// If `require_sequence_at_least` is given and the store's current
    /// sequence is below it, nothing is written. Unique constraints are
    /// validated against the batch applied in order; a violation also
    /// leaves no trace. Returns the range of sequences consumed.
    ///
    /// # Errors
    ///
    /// `SequenceTooLow` if the guard fails, `UniqueConstraintViolation` if
    /// validation fails, or any WAL/flush error.
    pub fn batch(
        &self,
        ops: Vec<BatchOp<T>>,
        require_sequence_at_least: Option<u64>,
    ) -> CoreResult<Range<u64>> {
        if let Some(required) = require_sequence_at_least {
            let current = self.store.current_sequence();
            if current < required {
                return Err(CoreError::SequenceTooLow { required, current });
            }
        }
        if ops.is_empty() {
            let next = self.store.current_sequence() + 1;
            return Ok(next..next);
        }

        self.store.stats.record_batch();
        self.event(|collection| LogEvent::Batch {
            collection,
            count: ops.len(),
        });

        let mut prepared = Vec::with_capacity(ops.len());
        let mut writes = Vec::with_capacity(ops.len());
        for op in &ops {
            match op {
                BatchOp::Put(doc) => {
                    let id = doc.id().to_key_bytes();
                    writes.push((self.key(&id), Some(doc.encode()?)));
                    prepared.push((id, Some(doc)));
                }
                BatchOp::Delete(id) => {
                    let id = id.to_key_bytes();
                    writes.push((self.key(&id), None));
                    prepared.push((id, None));
                }
            }
        }

        let mut state = self.shared.state.lock();
        state.check_batch(&prepared)?;
        let start = self.store.commit(writes, None)?;

        for (offset, (id, doc)) in (0u64..).zip(prepared) {
            let seq = start + offset;
            match doc {
                Some(doc) => {
                    self.store.stats.record_put();
                    state.apply_put(id, doc.clone(), seq);
                }
                None => {
                    self.store.stats.record_delete();
                    state.apply_delete(id, seq);
                }
            }
        }
        let end = start + ops.len() as u64;
        Ok(start..end)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the document visible under `snapshot`, or the latest
    /// version when `snapshot` is `None`.
    pub fn get(&self, id: &T::Id, snapshot: Option<Snapshot>) -> CoreResult<Option<T>> {
        self.store.stats.record_get();
        self.event(|collection| LogEvent::Get { collection });
        let id = id.to_key_bytes();
        Ok(self.shared.state.lock().get(&id, snapshot).cloned())
    }

    /// Returns every version of a document visible under `snapshot`,
    /// oldest first. Deletes appear as `None`.
    pub fn history(&self, id: &T::Id, snapshot: Option<Snapshot>) -> CoreResult<Vec<(u64, Option<T>)>> {
        self.store.stats.record_history();
        self.event(|collection| LogEvent::History { collection });
        let id = id.to_key_bytes();
        Ok(self.shared.state.lock().history(&id, snapshot))
    }

    /// Looks up documents by exact key in a unique or multi index.
    ///
    /// Unknown indexes and text/vector indexes yield no results.
    pub fn by_index(&self, index: &str, key: &str, snapshot: Option<Snapshot>) -> CoreResult<Vec<T>> {
        self.record_lookup(index);
        Ok(self.shared.state.lock().by_index(index, key, snapshot))
    }

    /// Scans a unique or multi index by key prefix, in key order.
    pub fn scan_index(
        &self,
        index: &str,
        prefix: &str,
        limit: Option<usize>,
        snapshot: Option<Snapshot>,
    ) -> CoreResult<Vec<T>> {
        self.record_lookup(index);
        let limit = limit.unwrap_or_else(|| self.store.default_scan_limit());
        Ok(self
            .shared
            .state
            .lock()
            .scan_index(index, prefix, limit, snapshot))
    }

    /// Full-text search, best match first. All query terms must match.
    pub fn search_text(&self, index: &str, query: &str, limit: Option<usize>) -> CoreResult<Vec<T>> {
        self.record_lookup(index);
        Ok(self.shared.state.lock().search_text(index, query, limit))
    }

    /// Returns up to `k` documents nearest to `query`.
    pub fn vector_search(
        &self,
        index: &str,
        query: &[f64],
        k: usize,
        metric: DistanceMetric,
    ) -> CoreResult<Vec<T>> {
        self.record_lookup(index);
        Ok(self
            .shared
            .state
            .lock()
            .vector_search(index, query, k, metric))
    }

    /// Returns live documents ordered by id key bytes, optionally filtered
    /// by an id-bytes prefix.
    ///
    /// `limit` defaults to the store's configured scan limit.
    pub fn scan(
        &self,
        prefix: Option<&[u8]>,
        limit: Option<usize>,
        snapshot: Option<Snapshot>,
    ) -> CoreResult<Vec<T>> {
        self.store.stats.record_scan();
        self.event(|collection| LogEvent::Scan { collection });
        let limit = limit.unwrap_or_else(|| self.store.default_scan_limit());
        Ok(self.shared.state.lock().scan(prefix, limit, snapshot))
    }

    /// Number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().len()
    }

    /// Returns true if there are no live documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_lookup(&self, index: &str) {
        self.store.stats.record_index_lookup();
        self.event(|collection| LogEvent::IndexLookup {
            collection,
            index: index.to_string(),
        });
    }
}
