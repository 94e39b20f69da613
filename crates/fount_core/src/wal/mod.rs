//! Write-Ahead Log (WAL) for durability and crash recovery.
//!
//! Every mutation is appended to the WAL and synced before it is applied in
//! memory. On open, records newer than the manifest sequence are replayed.
//!
//! ## WAL Record Format
//!
//! ```text
//! | sequence (8, BE) | length (4, BE) | payload (N) | crc32(payload) (4, BE) |
//! ```
//!
//! ## Recovery Policy
//!
//! Replay reads from offset 0 and stops at the first record that is
//! incomplete or whose checksum does not match. Everything after that point is
//! treated as a torn write and ignored. A damaged tail is end-of-log, not an
//! error.
//!
//! ## Invariants
//!
//! - WAL is **append-only** between truncations
//! - WAL order equals sequence order (appends happen under the store write lock)
//! - Replay is **idempotent**

mod record;
mod writer;

pub use record::{WalPayload, WalRecord, RECORD_OVERHEAD};
pub use writer::{ReplayReport, WalManager};
