//! # FountDB Testkit
//!
//! Test utilities for FountDB.
//!
//! This crate provides:
//! - Temporary stores and sample document types
//! - Scripted fault injection at the store's crash points
//! - A WAL backend that simulates crashes mid-write
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fount_testkit::prelude::*;
//!
//! #[test]
//! fn survives_reopen() {
//!     let mut store = TestStore::new();
//!     store.collection::<Note>("notes").unwrap().put(&Note::new(1, "a", "hello")).unwrap();
//!     store.reopen();
//!     assert_eq!(store.collection::<Note>("notes").unwrap().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use faults::*;
pub use fixtures::*;
pub use generators::*;
