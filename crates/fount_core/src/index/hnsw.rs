//! Deterministic HNSW vector index.
//!
//! Levels come from a hash of the node label rather than a random draw, and
//! neighbours are chosen by exhaustive nearest search at insert time, so the
//! same inserts always build the same graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Neighbour lists are truncated to this fanout at every level.
pub const MAX_NEIGHBORS: usize = 4;

/// Distance function used by searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// One minus cosine similarity.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors; extra dimensions on either side are ignored.
    #[must_use]
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => 1.0 - cosine(a, b),
        }
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Level for a label: trailing one-bits of a 31-multiplier rolling hash.
fn level_for(label: &str) -> usize {
    let seed = label
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
    seed.trailing_ones() as usize
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    vector: Vec<f64>,
    /// Neighbour labels per level, `0..=level`.
    neighbors: Vec<Vec<String>>,
}

impl Node {
    fn level(&self) -> usize {
        self.neighbors.len() - 1
    }
}

/// Approximate nearest-neighbour index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HnswIndex {
    nodes: BTreeMap<String, Node>,
    entry: Option<String>,
    max_level: usize,
}

impl HnswIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of indexed vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts or replaces the vector for `label`.
    ///
    /// At each of the node's levels it links to the closest existing nodes
    /// (by L2) and each of those links back, keeping only their closest
    /// [`MAX_NEIGHBORS`].
    pub fn add(&mut self, label: &str, vector: Vec<f64>) {
        if self.nodes.contains_key(label) {
            self.remove(label);
        }
        let level = level_for(label);
        let mut node = Node {
            vector,
            neighbors: vec![Vec::new(); level + 1],
        };
        if self.nodes.is_empty() {
            self.nodes.insert(label.to_owned(), node);
            self.entry = Some(label.to_owned());
            self.max_level = level;
            return;
        }

        for l in 0..=level {
            let mut candidates: Vec<(&String, f64)> = self
                .nodes
                .iter()
                .filter(|(_, other)| other.level() >= l)
                .map(|(id, other)| (id, DistanceMetric::L2.distance(&node.vector, &other.vector)))
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
            let nearest: Vec<String> = candidates
                .into_iter()
                .take(MAX_NEIGHBORS)
                .map(|(id, _)| id.clone())
                .collect();

            for neighbor in &nearest {
                self.link(neighbor, l, label, &node.vector);
            }
            node.neighbors[l] = nearest;
        }

        self.nodes.insert(label.to_owned(), node);
        if level > self.max_level {
            self.max_level = level;
            self.entry = Some(label.to_owned());
        }
    }

    /// Adds `label` to `from`'s list at `level`, pruning the farthest link.
    fn link(&mut self, from: &str, level: usize, label: &str, vector: &[f64]) {
        let Some(base) = self.nodes.get(from) else {
            return;
        };
        let mut list = base.neighbors[level].clone();
        list.push(label.to_owned());
        if list.len() > MAX_NEIGHBORS {
            let mut scored: Vec<(String, f64)> = list
                .into_iter()
                .map(|id| {
                    let other = if id == label {
                        vector
                    } else {
                        self.nodes.get(&id).map_or(&[][..], |n| n.vector.as_slice())
                    };
                    let d = DistanceMetric::L2.distance(other, &base.vector);
                    (id, d)
                })
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            scored.truncate(MAX_NEIGHBORS);
            list = scored.into_iter().map(|(id, _)| id).collect();
        }
        if let Some(node) = self.nodes.get_mut(from) {
            node.neighbors[level] = list;
        }
    }

    /// Removes `label` and every link to it. Unknown labels are ignored.
    pub fn remove(&mut self, label: &str) {
        if self.nodes.remove(label).is_none() {
            return;
        }
        for node in self.nodes.values_mut() {
            for list in &mut node.neighbors {
                list.retain(|id| id != label);
            }
        }
        if self.entry.as_deref() == Some(label) {
            self.entry = self
                .nodes
                .iter()
                .max_by(|a, b| a.1.level().cmp(&b.1.level()).then_with(|| b.0.cmp(a.0)))
                .map(|(id, _)| id.clone());
        }
        self.max_level = self.nodes.values().map(Node::level).max().unwrap_or(0);
    }

    /// Returns up to `k` labels nearest to `query`, closest first.
    ///
    /// Descends greedily from the entry point through the upper levels, then
    /// walks the level-0 graph breadth first and ranks everything reached.
    #[must_use]
    pub fn search(&self, query: &[f64], k: usize, metric: DistanceMetric) -> Vec<String> {
        let Some(entry) = self.entry.as_ref() else {
            return Vec::new();
        };
        let Some(entry_node) = self.nodes.get(entry) else {
            return Vec::new();
        };
        let mut current = entry.clone();
        let mut current_dist = metric.distance(query, &entry_node.vector);

        for l in (1..=self.max_level).rev() {
            let mut changed = true;
            while changed {
                changed = false;
                let neighbors = self
                    .nodes
                    .get(&current)
                    .and_then(|n| n.neighbors.get(l))
                    .cloned()
                    .unwrap_or_default();
                for n in neighbors {
                    if let Some(node) = self.nodes.get(&n) {
                        let d = metric.distance(query, &node.vector);
                        if d < current_dist {
                            current_dist = d;
                            current = n;
                            changed = true;
                        }
                    }
                }
            }
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut scored: Vec<(&str, f64)> = Vec::new();
        if let Some((label, _)) = self.nodes.get_key_value(&current) {
            visited.insert(label.as_str());
            queue.push_back(label.as_str());
            scored.push((label.as_str(), current_dist));
        }
        while let Some(v) = queue.pop_front() {
            let Some(node) = self.nodes.get(v) else {
                continue;
            };
            for n in &node.neighbors[0] {
                if !visited.insert(n.as_str()) {
                    continue;
                }
                if let Some(other) = self.nodes.get(n) {
                    scored.push((n.as_str(), metric.distance(query, &other.vector)));
                    queue.push_back(n.as_str());
                }
            }
        }
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(label, _)| label.to_owned())
            .collect()
    }
}
