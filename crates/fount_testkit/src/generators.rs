//! Property-based test generators using proptest.
//!
//! Ids and tags are drawn from small ranges so generated operation
//! sequences revisit the same documents and index keys.

use crate::fixtures::Note;
use proptest::prelude::*;

/// Words used to build note bodies.
pub const VOCABULARY: [&str; 8] = [
    "log", "merge", "table", "bloom", "index", "vector", "snapshot", "flush",
];

/// One generated collection operation.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteOp {
    /// Put a note.
    Put(Note),
    /// Delete a note by id.
    Delete(u64),
}

/// Strategy for note ids in `1..=16`.
pub fn note_id_strategy() -> impl Strategy<Value = u64> {
    1u64..=16
}

/// Strategy for tags from a set of four.
pub fn tag_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string)
}

/// Strategy for bodies of one to five vocabulary words.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(VOCABULARY.to_vec()), 1..=5)
        .prop_map(|words| words.join(" "))
}

/// Strategy for two-dimensional embeddings on a small grid.
pub fn embedding_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((-4i32..=4).prop_map(f64::from), 2)
}

/// Strategy for notes.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    (
        note_id_strategy(),
        tag_strategy(),
        body_strategy(),
        embedding_strategy(),
    )
        .prop_map(|(id, tag, body, embedding)| Note::new(id, tag, body).with_embedding(embedding))
}

/// Strategy for a single operation, three puts to one delete.
pub fn note_op_strategy() -> impl Strategy<Value = NoteOp> {
    prop_oneof![
        3 => note_strategy().prop_map(NoteOp::Put),
        1 => note_id_strategy().prop_map(NoteOp::Delete),
    ]
}

/// Strategy for operation sequences of up to `max` operations.
pub fn note_ops_strategy(max: usize) -> impl Strategy<Value = Vec<NoteOp>> {
    prop::collection::vec(note_op_strategy(), 0..=max)
}

/// Strategy for valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn notes_stay_in_range(note in note_strategy()) {
            prop_assert!((1..=16).contains(&note.id));
            prop_assert_eq!(note.embedding.len(), 2);
            prop_assert!(note.body.split(' ').all(|w| VOCABULARY.contains(&w)));
        }

        #[test]
        fn names_have_no_separator(name in collection_name_strategy()) {
            prop_assert!(!name.contains('\0'));
            prop_assert!(!name.is_empty());
        }
    }
}
