//! Test fixtures and store helpers.
//!
//! Provides temporary stores that can be reopened in place and a couple of
//! document types covering the index kinds.

use fount_core::{codec, Config, CoreResult, Document, Store};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempDir;

/// A note with a tag, free text and an embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Identifier.
    pub id: u64,
    /// Single tag, for multi-value indexes.
    pub tag: String,
    /// Body text, for full-text indexes.
    pub body: String,
    /// Embedding, for vector indexes.
    pub embedding: Vec<f64>,
}

impl Note {
    /// Creates a note without an embedding.
    pub fn new(id: u64, tag: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            body: body.into(),
            embedding: Vec::new(),
        }
    }

    /// Sets the embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = embedding;
        self
    }
}

impl Document for Note {
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

/// A user keyed by handle, with an email for unique indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Handle, used as the id.
    pub handle: String,
    /// Email address.
    pub email: String,
}

impl User {
    /// Creates a user.
    pub fn new(handle: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            email: email.into(),
        }
    }
}

impl Document for User {
    type Id = String;

    fn id(&self) -> String {
        self.handle.clone()
    }

    fn encode(&self) -> CoreResult<Vec<u8>> {
        codec::to_cbor(self)
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        codec::from_cbor(bytes)
    }
}

/// Default configuration for tests: no background compaction, so table
/// counts are deterministic.
pub fn test_config() -> Config {
    Config::default().background_compaction(false)
}

/// A store in a temporary directory that can be reopened in place.
pub struct TestStore {
    store: Option<Store>,
    config: Config,
    dir: TempDir,
}

impl TestStore {
    /// Opens a store with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Opens a store with `config`.
    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(dir.path(), config.clone()).expect("Failed to open store");
        Self {
            store: Some(store),
            config,
            dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the open store.
    pub fn store(&self) -> &Store {
        self.store.as_ref().expect("store is closed")
    }

    /// Drops the store without closing it, then opens the directory again.
    ///
    /// Collection handles from before must be dropped first; they keep the
    /// directory lock alive.
    pub fn reopen(&mut self) {
        let config = self.config.clone();
        self.reopen_with(config);
    }

    /// Like [`TestStore::reopen`], with a different configuration.
    pub fn reopen_with(&mut self, config: Config) {
        self.store = None;
        self.store = Some(Store::open(self.dir.path(), config.clone()).expect("Failed to reopen store"));
        self.config = config;
    }

    /// Drops the store, leaving the directory in place.
    pub fn shut_down(&mut self) {
        self.store = None;
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        self.store()
    }
}

/// Runs a test with a temporary store.
///
/// # Example
///
/// ```rust,ignore
/// use fount_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     let notes = store.collection::<Note>("notes").unwrap();
///     notes.put(&Note::new(1, "a", "hello")).unwrap();
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::new();
    f(test_store.store())
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Tags cycled through by [`notes_store`].
    pub const TAGS: [&str; 3] = ["red", "green", "blue"];

    /// Creates a store whose `notes` collection holds `count` notes with ids
    /// `1..=count`.
    pub fn notes_store(count: u64) -> TestStore {
        let store = TestStore::new();
        let notes = store
            .collection::<Note>("notes")
            .expect("Failed to open collection");
        for id in 1..=count {
            let tag = TAGS[(id as usize) % TAGS.len()];
            notes
                .put(&Note::new(id, tag, format!("note number {id}")))
                .expect("Failed to put note");
        }
        store
    }
}
