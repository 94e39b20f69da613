//! Collection behaviour through the public API.

use fount_core::{
    codec, stopword_analyzer, BatchOp, Config, CoreError, CoreResult, DistanceMetric, Document,
    IndexDefinition, LogEvent, Snapshot, Store,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    id: u64,
    tag: String,
    text: String,
    vector: Vec<f64>,
}

impl Doc {
    fn tagged(id: u64, tag: &str) -> Self {
        Self {
            id,
            tag: tag.into(),
            text: String::new(),
            vector: Vec::new(),
        }
    }

    fn text(id: u64, text: &str) -> Self {
        Self {
            text: text.into(),
            ..Self::tagged(id, "")
        }
    }

    fn point(id: u64, x: f64, y: f64) -> Self {
        Self {
            vector: vec![x, y],
            ..Self::tagged(id, "")
        }
    }
}

impl Document for Doc {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }

    fn encode(&self) -> CoreResult<Vec<u8>> {
        codec::to_cbor(self)
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        codec::from_cbor(bytes)
    }
}

fn open(config: Config) -> (TempDir, Store) {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path(), config.background_compaction(false)).unwrap();
    (dir, store)
}

fn ids(docs: &[Doc]) -> Vec<u64> {
    let mut ids: Vec<u64> = docs.iter().map(|d| d.id).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn history_is_ordered_and_snapshots_pick_last_visible() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();

    let s1 = docs.put(&Doc::tagged(7, "v1")).unwrap();
    let s2 = docs.put(&Doc::tagged(7, "v2")).unwrap();
    let s3 = docs.delete(&7).unwrap();
    let s4 = docs.put(&Doc::tagged(7, "v3")).unwrap();
    assert!(s1 < s2 && s2 < s3 && s3 < s4);

    let history = docs.history(&7, None).unwrap();
    let seqs: Vec<u64> = history.iter().map(|(s, _)| *s).collect();
    assert_eq!(seqs, vec![s1, s2, s3, s4]);
    assert!(history[2].1.is_none());

    assert_eq!(docs.get(&7, Some(Snapshot::at(s1))).unwrap().unwrap().tag, "v1");
    assert_eq!(docs.get(&7, Some(Snapshot::at(s2))).unwrap().unwrap().tag, "v2");
    assert!(docs.get(&7, Some(Snapshot::at(s3))).unwrap().is_none());
    assert_eq!(docs.get(&7, None).unwrap().unwrap().tag, "v3");
    assert!(docs.get(&7, Some(Snapshot::at(0))).unwrap().is_none());

    let bounded = docs.history(&7, Some(Snapshot::at(s2))).unwrap();
    assert_eq!(bounded.len(), 2);
}

#[test]
fn snapshot_reads_ignore_later_writes() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.put(&Doc::tagged(1, "before")).unwrap();

    let snapshot = store.snapshot();
    docs.put(&Doc::tagged(1, "after")).unwrap();
    docs.put(&Doc::tagged(2, "new")).unwrap();

    assert_eq!(docs.get(&1, Some(snapshot)).unwrap().unwrap().tag, "before");
    assert_eq!(docs.get(&1, None).unwrap().unwrap().tag, "after");
    assert_eq!(docs.scan(None, None, Some(snapshot)).unwrap().len(), 1);
    assert_eq!(docs.scan(None, None, None).unwrap().len(), 2);
}

#[test]
fn multi_index_follows_moves_and_snapshots() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::multi("byTag", |d: &Doc| d.tag.clone()))
        .unwrap();

    docs.put(&Doc::tagged(1, "a")).unwrap();
    docs.put(&Doc::tagged(2, "a")).unwrap();
    docs.put(&Doc::tagged(3, "b")).unwrap();
    let snapshot = store.snapshot();
    docs.delete(&1).unwrap();
    docs.put(&Doc::tagged(2, "b")).unwrap();

    assert!(docs.by_index("byTag", "a", None).unwrap().is_empty());
    assert_eq!(ids(&docs.by_index("byTag", "b", None).unwrap()), vec![2, 3]);
    assert_eq!(
        ids(&docs.by_index("byTag", "a", Some(snapshot)).unwrap()),
        vec![1, 2]
    );
}

#[test]
fn full_text_search_is_conjunctive() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::full_text("byText", |d: &Doc| d.text.clone()))
        .unwrap();
    docs.put(&Doc::text(1, "hello world")).unwrap();
    docs.put(&Doc::text(2, "hello swift")).unwrap();

    assert_eq!(ids(&docs.search_text("byText", "hello", None).unwrap()), vec![1, 2]);
    assert_eq!(ids(&docs.search_text("byText", "world", None).unwrap()), vec![1]);
    assert!(docs.search_text("byText", "swift world", None).unwrap().is_empty());
    assert_eq!(docs.search_text("byText", "HELLO", Some(1)).unwrap().len(), 1);

    docs.put(&Doc::text(1, "goodbye")).unwrap();
    assert_eq!(ids(&docs.search_text("byText", "hello", None).unwrap()), vec![2]);
    docs.delete(&2).unwrap();
    assert!(docs.search_text("byText", "hello", None).unwrap().is_empty());
}

#[test]
fn full_text_ranks_by_bm25() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.put(&Doc::text(1, "rust storage engine with a log")).unwrap();
    docs.put(&Doc::text(2, "log log log")).unwrap();
    docs.put(&Doc::text(3, "nothing relevant")).unwrap();
    // defined after the writes, so it is built from existing documents
    docs.define(IndexDefinition::full_text_with(
        "byText",
        |d: &Doc| d.text.clone(),
        stopword_analyzer(["a", "with"]),
    ))
    .unwrap();

    let hits = docs.search_text("byText", "log", None).unwrap();
    assert_eq!(hits.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 1]);
    assert!(docs.search_text("byText", "with", None).unwrap().is_empty());
}

#[test]
fn unique_violation_leaves_no_trace() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::unique("byTag", |d: &Doc| d.tag.clone()))
        .unwrap();
    docs.put(&Doc::tagged(1, "taken")).unwrap();
    let before = store.sequence();
    let pending = store.pending_entries();

    let err = docs.put(&Doc::tagged(2, "taken")).unwrap_err();
    match err {
        CoreError::UniqueConstraintViolation { index, key } => {
            assert_eq!(index, "byTag");
            assert_eq!(key, "taken");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(store.sequence(), before);
    assert_eq!(store.pending_entries(), pending);
    assert!(docs.get(&2, None).unwrap().is_none());
    assert_eq!(ids(&docs.by_index("byTag", "taken", None).unwrap()), vec![1]);

    // the owner itself may rewrite the key, and a freed key can be reused
    docs.put(&Doc::tagged(1, "taken")).unwrap();
    docs.put(&Doc::tagged(1, "moved")).unwrap();
    docs.put(&Doc::tagged(2, "taken")).unwrap();
    assert_eq!(ids(&docs.by_index("byTag", "taken", None).unwrap()), vec![2]);
}

#[test]
fn batch_uses_contiguous_sequences() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.put(&Doc::tagged(9, "x")).unwrap();

    let range = docs
        .batch(
            vec![
                BatchOp::Put(Doc::tagged(1, "a")),
                BatchOp::Put(Doc::tagged(2, "b")),
                BatchOp::Delete(9),
            ],
            None,
        )
        .unwrap();
    assert_eq!(range, 2..5);
    assert_eq!(store.sequence().as_u64(), 4);
    assert_eq!(docs.history(&2, None).unwrap()[0].0, 3);
    assert!(docs.get(&9, None).unwrap().is_none());
}

#[test]
fn batch_guard_fails_before_any_write() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.put(&Doc::tagged(1, "a")).unwrap();

    let err = docs
        .batch(vec![BatchOp::Put(Doc::tagged(2, "b"))], Some(10))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::SequenceTooLow {
            required: 10,
            current: 1
        }
    ));
    assert!(docs.get(&2, None).unwrap().is_none());
    assert_eq!(store.sequence().as_u64(), 1);

    assert!(docs
        .batch(vec![BatchOp::Put(Doc::tagged(2, "b"))], Some(1))
        .is_ok());
}

#[test]
fn batch_unique_violation_is_all_or_nothing() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::unique("byTag", |d: &Doc| d.tag.clone()))
        .unwrap();

    let err = docs
        .batch(
            vec![
                BatchOp::Put(Doc::tagged(1, "same")),
                BatchOp::Put(Doc::tagged(2, "other")),
                BatchOp::Put(Doc::tagged(3, "same")),
            ],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::UniqueConstraintViolation { .. }));
    assert!(docs.is_empty());
    assert_eq!(store.sequence().as_u64(), 0);
}

#[test]
fn scan_orders_by_id_and_applies_limits() {
    let (_dir, store) = open(Config::default().default_scan_limit(3));
    let docs = store.collection::<Doc>("docs").unwrap();
    for id in [5u64, 1, 300, 2, 4] {
        docs.put(&Doc::tagged(id, "t")).unwrap();
    }
    docs.delete(&4).unwrap();

    let default_limit = docs.scan(None, None, None).unwrap();
    assert_eq!(default_limit.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2, 5]);

    let all = docs.scan(None, Some(10), None).unwrap();
    assert_eq!(all.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2, 5, 300]);

    // ids below 256 share seven leading zero bytes
    let small = docs.scan(Some(&[0u8; 7]), Some(10), None).unwrap();
    assert_eq!(small.len(), 3);
    assert_eq!(docs.len(), 4);
}

#[test]
fn scan_index_walks_keys_by_prefix() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::multi("byTag", |d: &Doc| d.tag.clone()))
        .unwrap();
    docs.put(&Doc::tagged(3, "user:bob")).unwrap();
    docs.put(&Doc::tagged(1, "user:amy")).unwrap();
    docs.put(&Doc::tagged(2, "user:amy")).unwrap();
    docs.put(&Doc::tagged(4, "admin:root")).unwrap();

    let users = docs.scan_index("byTag", "user:", None, None).unwrap();
    assert_eq!(users.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    let limited = docs.scan_index("byTag", "user:", Some(2), None).unwrap();
    assert_eq!(limited.len(), 2);
    assert!(docs.scan_index("missing", "", None, None).unwrap().is_empty());
}

#[test]
fn vector_search_finds_nearest() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::vector("byVector", |d: &Doc| d.vector.clone()))
        .unwrap();
    docs.put(&Doc::point(1, 0.0, 0.0)).unwrap();
    docs.put(&Doc::point(2, 1.0, 0.0)).unwrap();
    docs.put(&Doc::point(3, 2.0, 0.0)).unwrap();
    docs.put(&Doc::point(4, 5.0, 5.0)).unwrap();
    docs.put(&Doc::point(5, 10.0, 10.0)).unwrap();

    let nearest = docs
        .vector_search("byVector", &[1.2, 0.0], 2, DistanceMetric::L2)
        .unwrap();
    assert_eq!(nearest.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 3]);

    docs.delete(&2).unwrap();
    let nearest = docs
        .vector_search("byVector", &[1.2, 0.0], 1, DistanceMetric::L2)
        .unwrap();
    assert_eq!(nearest[0].id, 3);

    let cosine = docs
        .vector_search("byVector", &[1.0, 1.0], 1, DistanceMetric::Cosine)
        .unwrap();
    assert!(cosine[0].id == 4 || cosine[0].id == 5);
}

#[test]
fn mismatched_index_kinds_return_nothing() {
    let (_dir, store) = open(Config::default());
    let docs = store.collection::<Doc>("docs").unwrap();
    docs.define(IndexDefinition::full_text("byText", |d: &Doc| d.text.clone()))
        .unwrap();
    docs.define(IndexDefinition::multi("byTag", |d: &Doc| d.tag.clone()))
        .unwrap();
    docs.put(&Doc::text(1, "hello")).unwrap();

    assert!(docs.by_index("byText", "hello", None).unwrap().is_empty());
    assert!(docs.search_text("byTag", "hello", None).unwrap().is_empty());
    assert!(docs
        .vector_search("byText", &[0.0], 1, DistanceMetric::L2)
        .unwrap()
        .is_empty());

    assert_eq!(docs.index_names(), vec!["byTag".to_string(), "byText".to_string()]);
    assert!(docs.drop_index("byText"));
    assert!(!docs.drop_index("byText"));
    assert!(docs.search_text("byText", "hello", None).unwrap().is_empty());
}

#[test]
fn events_and_metrics_track_operations() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let config = Config::default().event_sink(Arc::new(move |e: &LogEvent| sink.lock().push(e.clone())));
    let (_dir, store) = open(config);
    let docs = store.collection::<Doc>("docs").unwrap();

    docs.put(&Doc::tagged(1, "a")).unwrap();
    docs.get(&1, None).unwrap();
    docs.history(&1, None).unwrap();
    docs.by_index("none", "a", None).unwrap();
    docs.scan(None, None, None).unwrap();
    docs.batch(vec![BatchOp::Put(Doc::tagged(2, "b")), BatchOp::Delete(1)], None)
        .unwrap();
    docs.delete(&2).unwrap();

    let kinds: Vec<&str> = events.lock().iter().map(LogEvent::kind).collect();
    assert_eq!(
        kinds,
        vec!["put", "get", "history", "indexLookup", "scan", "batch", "delete"]
    );
    assert!(events.lock().iter().all(|e| e.collection() == "docs"));

    let metrics = store.metrics();
    assert_eq!(metrics.puts, 2);
    assert_eq!(metrics.deletes, 2);
    assert_eq!(metrics.gets, 1);
    assert_eq!(metrics.histories, 1);
    assert_eq!(metrics.index_lookups, 1);
    assert_eq!(metrics.scans, 1);
    assert_eq!(metrics.batches, 1);

    store.reset_metrics();
    assert_eq!(store.metrics().puts, 0);
}

#[test]
fn string_ids_scan_in_lexicographic_order() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Named {
        name: String,
    }

    impl Document for Named {
        type Id = String;

        fn id(&self) -> String {
            self.name.clone()
        }

        fn encode(&self) -> CoreResult<Vec<u8>> {
            codec::to_cbor(self)
        }

        fn decode(bytes: &[u8]) -> CoreResult<Self> {
            codec::from_cbor(bytes)
        }
    }

    let (_dir, store) = open(Config::default());
    let names = store.collection::<Named>("names").unwrap();
    for name in ["carol", "alice", "bob", "alfred"] {
        names.put(&Named { name: name.into() }).unwrap();
    }
    let scanned: Vec<String> = names
        .scan(Some(b"al"), None, None)
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(scanned, vec!["alfred", "alice"]);
}
