//! Secondary index definitions and their per-collection state.
//!
//! Unique and multi indexes are versioned like documents, so they answer
//! snapshot reads. Text and vector indexes hold only the current state.

use super::versions::Versions;
use crate::index::{default_analyzer, Analyzer, FtsIndex, HnswIndex};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Extracts a string key from a document.
pub type KeyExtractor<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Extracts an embedding from a document.
pub type VectorExtractor<T> = Arc<dyn Fn(&T) -> Vec<f64> + Send + Sync>;

/// What an index stores and how it is queried.
pub enum IndexKind<T> {
    /// At most one document per key.
    Unique(KeyExtractor<T>),
    /// Any number of documents per key.
    Multi(KeyExtractor<T>),
    /// Tokenized text ranked by BM25.
    FullText {
        /// Text to index.
        extract: KeyExtractor<T>,
        /// Tokenizer for documents and queries.
        analyzer: Analyzer,
    },
    /// Nearest-neighbour search over embeddings.
    Vector(VectorExtractor<T>),
}

impl<T> Clone for IndexKind<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unique(f) => Self::Unique(Arc::clone(f)),
            Self::Multi(f) => Self::Multi(Arc::clone(f)),
            Self::FullText { extract, analyzer } => Self::FullText {
                extract: Arc::clone(extract),
                analyzer: Arc::clone(analyzer),
            },
            Self::Vector(f) => Self::Vector(Arc::clone(f)),
        }
    }
}

impl<T> IndexKind<T> {
    /// Short name of the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unique(_) => "unique",
            Self::Multi(_) => "multi",
            Self::FullText { .. } => "fts",
            Self::Vector(_) => "vector",
        }
    }
}

impl<T> fmt::Debug for IndexKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named index over documents of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// notes.define(IndexDefinition::multi("byTag", |n: &Note| n.tag.clone()))?;
/// notes.define(IndexDefinition::full_text("byBody", |n: &Note| n.body.clone()))?;
/// ```
#[derive(Debug, Clone)]
pub struct IndexDefinition<T> {
    /// Index name, unique within a collection.
    pub name: String,
    /// Index kind with its extractor.
    pub kind: IndexKind<T>,
}

impl<T> IndexDefinition<T> {
    /// Defines a unique index.
    pub fn unique(
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Unique(Arc::new(extract)),
        }
    }

    /// Defines a multi-value index.
    pub fn multi(
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Multi(Arc::new(extract)),
        }
    }

    /// Defines a full-text index using the default analyzer.
    pub fn full_text(
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::full_text_with(name, extract, default_analyzer())
    }

    /// Defines a full-text index with a custom analyzer.
    pub fn full_text_with(
        name: impl Into<String>,
        extract: impl Fn(&T) -> String + Send + Sync + 'static,
        analyzer: Analyzer,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::FullText {
                extract: Arc::new(extract),
                analyzer,
            },
        }
    }

    /// Defines a vector index.
    pub fn vector(
        name: impl Into<String>,
        extract: impl Fn(&T) -> Vec<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Vector(Arc::new(extract)),
        }
    }
}

/// Text label for an id, used by the text and vector indexes.
pub(crate) fn label(id: &[u8]) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

/// Live state of one index.
pub(crate) enum IndexStorage<T> {
    Unique {
        extract: KeyExtractor<T>,
        map: BTreeMap<String, Versions<Option<Vec<u8>>>>,
    },
    Multi {
        extract: KeyExtractor<T>,
        map: BTreeMap<String, Versions<Arc<Vec<Vec<u8>>>>>,
    },
    FullText {
        extract: KeyExtractor<T>,
        index: FtsIndex,
        ids: HashMap<String, Vec<u8>>,
    },
    Vector {
        extract: VectorExtractor<T>,
        index: HnswIndex,
        ids: HashMap<String, Vec<u8>>,
    },
}

impl<T> IndexStorage<T> {
    /// Builds an index from the latest live version of every document.
    pub fn build<'a, I>(name: &str, kind: IndexKind<T>, latest: I) -> Self
    where
        T: 'a,
        I: IntoIterator<Item = (&'a Vec<u8>, u64, &'a T)>,
    {
        match kind {
            IndexKind::Unique(extract) => {
                let mut rows: Vec<(u64, String, &Vec<u8>)> = latest
                    .into_iter()
                    .map(|(id, seq, doc)| (seq, extract(doc), id))
                    .collect();
                rows.sort_by_key(|(seq, _, _)| *seq);
                let mut map: BTreeMap<String, Versions<Option<Vec<u8>>>> = BTreeMap::new();
                for (seq, key, id) in rows {
                    let versions = map.entry(key).or_default();
                    if versions.latest().is_some_and(Option::is_some) {
                        tracing::warn!(index = name, "documents share a unique key; newest wins");
                    }
                    versions.push(seq, Some(id.clone()));
                }
                Self::Unique { extract, map }
            }
            IndexKind::Multi(extract) => {
                let mut rows: Vec<(u64, String, &Vec<u8>)> = latest
                    .into_iter()
                    .map(|(id, seq, doc)| (seq, extract(doc), id))
                    .collect();
                rows.sort_by_key(|(seq, _, _)| *seq);
                let mut map: BTreeMap<String, Versions<Arc<Vec<Vec<u8>>>>> = BTreeMap::new();
                for (seq, key, id) in rows {
                    let versions = map.entry(key).or_default();
                    let mut ids = versions.latest().map_or_else(Vec::new, |v| v.to_vec());
                    ids.push(id.clone());
                    versions.push(seq, Arc::new(ids));
                }
                Self::Multi { extract, map }
            }
            IndexKind::FullText { extract, analyzer } => {
                let mut index = FtsIndex::new(analyzer);
                let mut ids = HashMap::new();
                for (id, _, doc) in latest {
                    let doc_label = label(id);
                    index.add(&doc_label, &extract(doc));
                    ids.insert(doc_label, id.clone());
                }
                Self::FullText {
                    extract,
                    index,
                    ids,
                }
            }
            IndexKind::Vector(extract) => {
                let mut index = HnswIndex::new();
                let mut ids = HashMap::new();
                for (id, _, doc) in latest {
                    let doc_label = label(id);
                    index.add(&doc_label, extract(doc));
                    ids.insert(doc_label, id.clone());
                }
                Self::Vector {
                    extract,
                    index,
                    ids,
                }
            }
        }
    }

    /// Returns the id currently owning `key` in a unique index.
    pub fn unique_owner(&self, key: &str) -> Option<&[u8]> {
        match self {
            Self::Unique { map, .. } => map.get(key)?.latest()?.as_deref(),
            _ => None,
        }
    }

    /// Returns the key extractor of a unique index.
    pub fn unique_extractor(&self) -> Option<&KeyExtractor<T>> {
        match self {
            Self::Unique { extract, .. } => Some(extract),
            _ => None,
        }
    }

    /// Updates the index for a put of `doc` replacing `old`.
    pub fn on_put(&mut self, id: &[u8], old: Option<&T>, doc: &T, seq: u64) {
        match self {
            Self::Unique { extract, map } => {
                let key = extract(doc);
                if let Some(old_key) = old.map(|o| extract(o)).filter(|k| *k != key) {
                    map.entry(old_key).or_default().push(seq, None);
                }
                map.entry(key).or_default().push(seq, Some(id.to_vec()));
            }
            Self::Multi { extract, map } => {
                let key = extract(doc);
                if let Some(old_key) = old.map(|o| extract(o)).filter(|k| *k != key) {
                    let versions = map.entry(old_key).or_default();
                    let mut ids = versions.latest().map_or_else(Vec::new, |v| v.to_vec());
                    ids.retain(|existing| existing.as_slice() != id);
                    versions.push(seq, Arc::new(ids));
                }
                let versions = map.entry(key).or_default();
                let mut ids = versions.latest().map_or_else(Vec::new, |v| v.to_vec());
                if !ids.iter().any(|existing| existing.as_slice() == id) {
                    ids.push(id.to_vec());
                }
                versions.push(seq, Arc::new(ids));
            }
            Self::FullText { extract, index, ids } => {
                let doc_label = label(id);
                index.add(&doc_label, &extract(doc));
                ids.insert(doc_label, id.to_vec());
            }
            Self::Vector { extract, index, ids } => {
                let doc_label = label(id);
                index.add(&doc_label, extract(doc));
                ids.insert(doc_label, id.to_vec());
            }
        }
    }

    /// Updates the index for a delete of `old`.
    pub fn on_delete(&mut self, id: &[u8], old: &T, seq: u64) {
        match self {
            Self::Unique { extract, map } => {
                map.entry(extract(old)).or_default().push(seq, None);
            }
            Self::Multi { extract, map } => {
                let versions = map.entry(extract(old)).or_default();
                let mut ids = versions.latest().map_or_else(Vec::new, |v| v.to_vec());
                ids.retain(|existing| existing.as_slice() != id);
                versions.push(seq, Arc::new(ids));
            }
            Self::FullText { index, ids, .. } => {
                let doc_label = label(id);
                index.remove(&doc_label);
                ids.remove(&doc_label);
            }
            Self::Vector { index, ids, .. } => {
                let doc_label = label(id);
                index.remove(&doc_label);
                ids.remove(&doc_label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;

    #[derive(Clone)]
    struct Doc {
        tag: String,
    }

    fn doc(tag: &str) -> Doc {
        Doc { tag: tag.into() }
    }

    #[test]
    fn labels_are_hex() {
        assert_eq!(label(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(label(&[]), "");
    }

    #[test]
    fn multi_index_versions_id_sets() {
        let def = IndexDefinition::multi("byTag", |d: &Doc| d.tag.clone());
        let mut storage = IndexStorage::build(&def.name, def.kind, Vec::new());
        let (a, b) = (vec![1u8], vec![2u8]);

        storage.on_put(&a, None, &doc("x"), 1);
        storage.on_put(&b, None, &doc("x"), 2);
        storage.on_put(&a, Some(&doc("x")), &doc("y"), 3);

        let IndexStorage::Multi { map, .. } = &storage else {
            panic!("expected multi index");
        };
        assert_eq!(**map["x"].latest().unwrap(), vec![b.clone()]);
        assert_eq!(
            **map["x"].at(Some(Snapshot::at(2))).unwrap(),
            vec![a.clone(), b]
        );
        assert_eq!(**map["y"].latest().unwrap(), vec![a]);
    }

    #[test]
    fn unique_index_releases_old_key() {
        let def = IndexDefinition::unique("byTag", |d: &Doc| d.tag.clone());
        let mut storage = IndexStorage::build(&def.name, def.kind, Vec::new());
        storage.on_put(&[7], None, &doc("k1"), 1);
        assert_eq!(storage.unique_owner("k1"), Some(&[7u8][..]));

        storage.on_put(&[7], Some(&doc("k1")), &doc("k2"), 2);
        assert_eq!(storage.unique_owner("k1"), None);
        assert_eq!(storage.unique_owner("k2"), Some(&[7u8][..]));

        storage.on_delete(&[7], &doc("k2"), 3);
        assert_eq!(storage.unique_owner("k2"), None);
    }

    #[test]
    fn build_uses_sequence_order() {
        let ids = [vec![1u8], vec![2u8]];
        let docs = [doc("t"), doc("t")];
        let def = IndexDefinition::multi("byTag", |d: &Doc| d.tag.clone());
        // id 2 was written before id 1
        let storage = IndexStorage::build(
            &def.name,
            def.kind,
            vec![(&ids[0], 9, &docs[0]), (&ids[1], 4, &docs[1])],
        );
        let IndexStorage::Multi { map, .. } = &storage else {
            panic!("expected multi index");
        };
        assert_eq!(map["t"].at(Some(Snapshot::at(5))).unwrap().len(), 1);
        assert_eq!(map["t"].latest().unwrap().len(), 2);
    }
}
