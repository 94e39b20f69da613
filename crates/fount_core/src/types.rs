//! Core type definitions for FountDB.

use std::fmt;

/// Sequence number ordering every mutation in the store.
///
/// Every put, delete and batch member consumes one distinct value.
/// Higher sequence numbers indicate later writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A captured sequence number bounding reads.
///
/// Reads through a snapshot see only versions written at or before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot {
    sequence: SequenceNumber,
}

impl Snapshot {
    /// Creates a snapshot at the given sequence.
    #[must_use]
    pub const fn at(sequence: u64) -> Self {
        Self {
            sequence: SequenceNumber(sequence),
        }
    }

    /// Returns the snapshot's sequence number.
    #[must_use]
    pub const fn sequence(self) -> SequenceNumber {
        self.sequence
    }

    /// Returns true if a version written at `seq` is visible.
    #[must_use]
    pub const fn sees(self, seq: u64) -> bool {
        seq <= self.sequence.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot@{}", self.sequence.0)
    }
}

/// Returns true if `seq` is visible under an optional snapshot.
#[must_use]
pub(crate) fn visible(snapshot: Option<Snapshot>, seq: u64) -> bool {
    snapshot.map_or(true, |s| s.sees(seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering() {
        let a = SequenceNumber::new(1);
        let b = a.next();
        assert!(a < b);
        assert_eq!(b.as_u64(), 2);
        assert_eq!(b.to_string(), "seq:2");
    }

    #[test]
    fn snapshot_visibility() {
        let snap = Snapshot::at(5);
        assert!(snap.sees(5));
        assert!(snap.sees(1));
        assert!(!snap.sees(6));
        assert!(visible(None, u64::MAX));
        assert!(!visible(Some(snap), 9));
    }
}
