//! # FountDB Storage
//!
//! Append-only byte logs used by the FountDB write-ahead log.
//!
//! Backends are **opaque**: they store and return bytes and never look at
//! record framing. The WAL in `fount_core` owns the format.
//!
//! ## Available Backends
//!
//! - [`FileLogBackend`] - a single OS file, `sync` maps to `fsync`
//! - [`MemoryLogBackend`] - a shared in-memory buffer for tests
//!
//! ## Example
//!
//! ```rust
//! use fount_storage::{LogBackend, MemoryLogBackend};
//!
//! let mut log = MemoryLogBackend::new();
//! let offset = log.append(b"hello").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(log.read_all().unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::LogBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileLogBackend;
pub use memory::MemoryLogBackend;
