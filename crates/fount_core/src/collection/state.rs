//! In-memory state of one collection: version chains plus indexes.

use super::codec::Document;
use super::index::{IndexDefinition, IndexStorage};
use super::versions::Versions;
use crate::error::{CoreError, CoreResult};
use crate::index::DistanceMetric;
use crate::types::Snapshot;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// A prepared write: id bytes and the new document, `None` for a delete.
pub(crate) type PreparedOp<'a, T> = (Vec<u8>, Option<&'a T>);

pub(crate) struct CollectionState<T: Document> {
    docs: BTreeMap<Vec<u8>, Versions<Option<T>>>,
    indexes: BTreeMap<String, IndexStorage<T>>,
}

impl<T: Document> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            docs: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }
}

/// Keys of `map` starting with `prefix`, in order.
fn prefixed<'m, K, V>(map: &'m BTreeMap<K, V>, prefix: &'m K) -> impl Iterator<Item = (&'m K, &'m V)>
where
    K: Ord + AsRef<[u8]>,
{
    let wanted: &[u8] = prefix.as_ref();
    map.range((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(k, _)| {
            let key: &[u8] = (*k).as_ref();
            key.starts_with(wanted)
        })
}

impl<T: Document> CollectionState<T> {
    /// Latest live version of a document.
    pub fn latest(&self, id: &[u8]) -> Option<&T> {
        self.docs.get(id)?.latest()?.as_ref()
    }

    /// Version of a document visible under `snapshot`.
    pub fn get(&self, id: &[u8], snapshot: Option<Snapshot>) -> Option<&T> {
        self.docs.get(id)?.at(snapshot)?.as_ref()
    }

    pub fn history(&self, id: &[u8], snapshot: Option<Snapshot>) -> Vec<(u64, Option<T>)> {
        self.docs
            .get(id)
            .map(|versions| versions.visible(snapshot).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of documents whose latest version is live.
    pub fn len(&self) -> usize {
        self.docs
            .values()
            .filter(|v| v.latest().is_some_and(Option::is_some))
            .count()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Builds `definition` from the latest live documents, replacing any
    /// index of the same name.
    pub fn define(&mut self, definition: IndexDefinition<T>) {
        let latest = self.docs.iter().filter_map(|(id, versions)| {
            let (seq, doc) = versions.latest_entry()?;
            doc.as_ref().map(|doc| (id, seq, doc))
        });
        let storage = IndexStorage::build(&definition.name, definition.kind, latest);
        self.indexes.insert(definition.name, storage);
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    pub fn apply_put(&mut self, id: Vec<u8>, doc: T, seq: u64) {
        let old = self.docs.get(&id).and_then(Versions::latest).and_then(Option::as_ref);
        for index in self.indexes.values_mut() {
            index.on_put(&id, old, &doc, seq);
        }
        self.docs.entry(id).or_default().push(seq, Some(doc));
    }

    pub fn apply_delete(&mut self, id: Vec<u8>, seq: u64) {
        if let Some(old) = self.docs.get(&id).and_then(Versions::latest).and_then(Option::as_ref) {
            for index in self.indexes.values_mut() {
                index.on_delete(&id, old, seq);
            }
        }
        self.docs.entry(id).or_default().push(seq, None);
    }

    /// Rejects a put that would give a unique key a second owner.
    pub fn check_put(&self, id: &[u8], doc: &T) -> CoreResult<()> {
        for (name, index) in &self.indexes {
            let Some(extract) = index.unique_extractor() else {
                continue;
            };
            let key = extract(doc);
            if index.unique_owner(&key).is_some_and(|owner| owner != id) {
                return Err(CoreError::unique_violation(name.as_str(), key));
            }
        }
        Ok(())
    }

    /// Validates unique constraints for a batch as if its ops were applied
    /// in order.
    pub fn check_batch(&self, ops: &[PreparedOp<'_, T>]) -> CoreResult<()> {
        let unique: Vec<_> = self
            .indexes
            .iter()
            .filter_map(|(name, index)| index.unique_extractor().map(|e| (name.as_str(), index, e)))
            .collect();
        if unique.is_empty() {
            return Ok(());
        }

        let mut docs: HashMap<&[u8], Option<&T>> = HashMap::new();
        let mut owners: HashMap<(&str, String), Option<&[u8]>> = HashMap::new();
        for (id, doc) in ops {
            let id = id.as_slice();
            let old = match docs.get(id) {
                Some(overlay) => *overlay,
                None => self.latest(id),
            };
            for (name, index, extract) in &unique {
                if let Some(old) = old {
                    owners.insert((*name, extract(old)), None);
                }
                let Some(doc) = *doc else { continue };
                let key = extract(doc);
                let owner = match owners.get(&(*name, key.clone())) {
                    Some(overlay) => *overlay,
                    None => index.unique_owner(&key),
                };
                if owner.is_some_and(|owner| owner != id) {
                    return Err(CoreError::unique_violation(*name, key));
                }
                owners.insert((*name, key), Some(id));
            }
            docs.insert(id, *doc);
        }
        Ok(())
    }

    pub fn by_index(&self, name: &str, key: &str, snapshot: Option<Snapshot>) -> Vec<T> {
        match self.indexes.get(name) {
            Some(IndexStorage::Unique { map, .. }) => map
                .get(key)
                .and_then(|v| v.at(snapshot))
                .and_then(Option::as_deref)
                .and_then(|id| self.get(id, snapshot))
                .cloned()
                .into_iter()
                .collect(),
            Some(IndexStorage::Multi { map, .. }) => map
                .get(key)
                .and_then(|v| v.at(snapshot))
                .map(|ids| self.resolve(ids, snapshot))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn scan_index(
        &self,
        name: &str,
        prefix: &str,
        limit: usize,
        snapshot: Option<Snapshot>,
    ) -> Vec<T> {
        let prefix = prefix.to_string();
        match self.indexes.get(name) {
            Some(IndexStorage::Unique { map, .. }) => prefixed(map, &prefix)
                .filter_map(|(_, v)| v.at(snapshot)?.as_deref())
                .filter_map(|id| self.get(id, snapshot).cloned())
                .take(limit)
                .collect(),
            Some(IndexStorage::Multi { map, .. }) => prefixed(map, &prefix)
                .filter_map(|(_, v)| v.at(snapshot))
                .flat_map(|ids| {
                    let mut ids: Vec<&Vec<u8>> = ids.iter().collect();
                    ids.sort();
                    ids.into_iter().filter_map(move |id| self.get(id, snapshot).cloned())
                })
                .take(limit)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn search_text(&self, name: &str, query: &str, limit: Option<usize>) -> Vec<T> {
        match self.indexes.get(name) {
            Some(IndexStorage::FullText { index, ids, .. }) => index
                .search(query, limit)
                .iter()
                .filter_map(|label| ids.get(label))
                .filter_map(|id| self.latest(id).cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn vector_search(&self, name: &str, query: &[f64], k: usize, metric: DistanceMetric) -> Vec<T> {
        match self.indexes.get(name) {
            Some(IndexStorage::Vector { index, ids, .. }) => index
                .search(query, k, metric)
                .iter()
                .filter_map(|label| ids.get(label))
                .filter_map(|id| self.latest(id).cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Live documents ordered by id bytes.
    pub fn scan(&self, prefix: Option<&[u8]>, limit: usize, snapshot: Option<Snapshot>) -> Vec<T> {
        let prefix = prefix.map(<[u8]>::to_vec).unwrap_or_default();
        prefixed(&self.docs, &prefix)
            .filter_map(|(_, versions)| versions.at(snapshot)?.clone())
            .take(limit)
            .collect()
    }

    fn resolve(&self, ids: &[Vec<u8>], snapshot: Option<Snapshot>) -> Vec<T> {
        ids.iter()
            .filter_map(|id| self.get(id, snapshot).cloned())
            .collect()
    }
}
