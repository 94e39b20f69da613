//! Structured log events.
//!
//! Every public collection operation emits one [`LogEvent`]. Events go to the
//! configured [`EventSink`] and are also traced at `TRACE` level.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A structured record of one collection operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogEvent {
    /// A document was written.
    Put {
        /// Collection name.
        collection: String,
    },
    /// A document was read.
    Get {
        /// Collection name.
        collection: String,
    },
    /// A document was deleted.
    Delete {
        /// Collection name.
        collection: String,
    },
    /// A collection scan ran.
    Scan {
        /// Collection name.
        collection: String,
    },
    /// An index was queried.
    IndexLookup {
        /// Collection name.
        collection: String,
        /// Index name.
        index: String,
    },
    /// A batch committed.
    Batch {
        /// Collection name.
        collection: String,
        /// Number of operations in the batch.
        count: usize,
    },
    /// A version history was read.
    History {
        /// Collection name.
        collection: String,
    },
}

impl LogEvent {
    /// Returns the collection the event belongs to.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Put { collection }
            | Self::Get { collection }
            | Self::Delete { collection }
            | Self::Scan { collection }
            | Self::IndexLookup { collection, .. }
            | Self::Batch { collection, .. }
            | Self::History { collection } => collection,
        }
    }

    /// Returns the event's type tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::Delete { .. } => "delete",
            Self::Scan { .. } => "scan",
            Self::IndexLookup { .. } => "indexLookup",
            Self::Batch { .. } => "batch",
            Self::History { .. } => "history",
        }
    }
}

/// Callback receiving every emitted event.
pub type EventSink = Arc<dyn Fn(&LogEvent) + Send + Sync>;

pub(crate) fn emit(sink: Option<&EventSink>, event: LogEvent) {
    tracing::trace!(kind = event.kind(), collection = event.collection(), "collection event");
    if let Some(sink) = sink {
        sink(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn serializes_with_type_tag() {
        let event = LogEvent::IndexLookup {
            collection: "notes".into(),
            index: "byTag".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "indexLookup");
        assert_eq!(json["collection"], "notes");
        assert_eq!(json["index"], "byTag");

        let batch = serde_json::to_string(&LogEvent::Batch {
            collection: "c".into(),
            count: 3,
        })
        .unwrap();
        assert_eq!(batch, r#"{"type":"batch","collection":"c","count":3}"#);
    }

    #[test]
    fn emit_reaches_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: EventSink = Arc::new(move |e: &LogEvent| captured.lock().push(e.clone()));

        emit(Some(&sink), LogEvent::Put { collection: "a".into() });
        emit(None, LogEvent::Get { collection: "a".into() });

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "put");
    }
}
