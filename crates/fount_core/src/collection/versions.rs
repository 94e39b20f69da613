//! Sequence-ordered version lists.

use crate::types::{visible, Snapshot};

/// Values tagged with the sequence that wrote them, ascending.
#[derive(Debug, Clone)]
pub(crate) struct Versions<V> {
    entries: Vec<(u64, V)>,
}

impl<V> Default for Versions<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> Versions<V> {
    /// Records `value` at `sequence`, keeping ascending order.
    pub fn push(&mut self, sequence: u64, value: V) {
        if self.entries.last().map_or(true, |(last, _)| *last <= sequence) {
            self.entries.push((sequence, value));
        } else {
            let at = self.entries.partition_point(|(s, _)| *s <= sequence);
            self.entries.insert(at, (sequence, value));
        }
    }

    /// Newest value.
    pub fn latest(&self) -> Option<&V> {
        self.entries.last().map(|(_, v)| v)
    }

    /// Newest value with its sequence.
    pub fn latest_entry(&self) -> Option<(u64, &V)> {
        self.entries.last().map(|(s, v)| (*s, v))
    }

    /// Newest value visible under `snapshot`.
    pub fn at(&self, snapshot: Option<Snapshot>) -> Option<&V> {
        match snapshot {
            None => self.latest(),
            Some(s) => {
                let end = self
                    .entries
                    .partition_point(|(seq, _)| s.sees(*seq));
                end.checked_sub(1).map(|i| &self.entries[i].1)
            }
        }
    }

    /// Every entry visible under `snapshot`, oldest first.
    pub fn visible(&self, snapshot: Option<Snapshot>) -> impl Iterator<Item = &(u64, V)> {
        self.entries
            .iter()
            .take_while(move |(seq, _)| visible(snapshot, *seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_respect_snapshots() {
        let mut v = Versions::default();
        v.push(2, "b");
        v.push(5, "e");
        v.push(9, "i");

        assert_eq!(v.latest(), Some(&"i"));
        assert_eq!(v.at(None), Some(&"i"));
        assert_eq!(v.at(Some(Snapshot::at(5))), Some(&"e"));
        assert_eq!(v.at(Some(Snapshot::at(4))), Some(&"b"));
        assert_eq!(v.at(Some(Snapshot::at(1))), None);
        assert_eq!(v.visible(Some(Snapshot::at(6))).count(), 2);
    }

    #[test]
    fn out_of_order_push_is_sorted() {
        let mut v = Versions::default();
        v.push(10, 'x');
        v.push(3, 'y');
        v.push(7, 'z');
        let seqs: Vec<u64> = v.visible(None).map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![3, 7, 10]);
        assert_eq!(v.latest(), Some(&'x'));
    }
}
