//! Crash-point hooks.
//!
//! The store consults a [`FaultInjector`] at a few named points on the write
//! and flush paths. Production stores use [`NoFaults`]; tests plug in an
//! injector that fails chosen points to simulate a crash.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// A named point on the write or flush path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// After records are appended to the WAL, before the sync.
    WalAppend,
    /// After the WAL sync, before the memtable insert.
    WalSync,
    /// Before the manifest is written.
    ManifestSave,
    /// Before a memtable flush writes its table.
    MemtableFlush,
}

impl FaultPoint {
    /// Returns the stable name of the point.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WalAppend => "wal_append",
            Self::WalSync => "wal_fsync",
            Self::ManifestSave => "manifest_save",
            Self::MemtableFlush => "memtable_flush",
        }
    }

    /// Builds the error an injector returns for this point.
    #[must_use]
    pub fn fault(self) -> CoreError {
        CoreError::InjectedFault { point: self.name() }
    }
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decides whether an operation may pass a fault point.
pub trait FaultInjector: Send + Sync {
    /// Returns an error to abort the operation at `point`.
    fn check(&self, point: FaultPoint) -> CoreResult<()>;
}

/// Injector that never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn check(&self, _point: FaultPoint) -> CoreResult<()> {
        Ok(())
    }
}
