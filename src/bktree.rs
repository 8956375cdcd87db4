//! BK-tree over Hamming distance.
//!
//! Nodes live in a flat arena. Each node owns one distinct fingerprint and
//! every item that carries it; children are keyed by their distance to the
//! parent.

use crate::perceptual_hash::{Fingerprint, hamming_distance};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Node {
    fingerprint: Fingerprint,
    items: Vec<usize>,
    children: BTreeMap<u32, usize>,
}

impl Node {
    fn new(fingerprint: Fingerprint, item: usize) -> Self {
        Node {
            fingerprint,
            items: vec![item],
            children: BTreeMap::new(),
        }
    }
}

/// Metric tree answering "everything within distance t of q" queries.
#[derive(Debug, Clone, Default)]
pub struct BkTree {
    nodes: Vec<Node>,
    len: usize,
}

impl BkTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item` under `fingerprint`.
    pub fn insert(&mut self, fingerprint: Fingerprint, item: usize) {
        self.len += 1;
        if self.nodes.is_empty() {
            self.nodes.push(Node::new(fingerprint, item));
            return;
        }

        let mut current = 0;
        loop {
            let distance = hamming_distance(&self.nodes[current].fingerprint, &fingerprint);
            if distance == 0 {
                self.nodes[current].items.push(item);
                return;
            }
            match self.nodes[current].children.get(&distance) {
                Some(&child) => current = child,
                None => {
                    let slot = self.nodes.len();
                    self.nodes.push(Node::new(fingerprint, item));
                    self.nodes[current].children.insert(distance, slot);
                    return;
                }
            }
        }
    }

    /// All `(item, distance)` pairs within `tolerance` of `fingerprint`.
    ///
    /// Subtrees whose edge distance lies outside `[d - t, d + t]` cannot
    /// hold a match by the triangle inequality and are skipped.
    pub fn find(&self, fingerprint: &Fingerprint, tolerance: u32) -> Vec<(usize, u32)> {
        let mut found = Vec::new();
        if self.nodes.is_empty() {
            return found;
        }

        let mut pending = vec![0usize];
        while let Some(index) = pending.pop() {
            let node = &self.nodes[index];
            let distance = hamming_distance(&node.fingerprint, fingerprint);
            if distance <= tolerance {
                found.extend(node.items.iter().map(|&item| (item, distance)));
            }
            let low = distance.saturating_sub(tolerance);
            let high = distance + tolerance;
            pending.extend(node.children.range(low..=high).map(|(_, &child)| child));
        }
        found
    }

    /// Number of items, counting every item sharing a fingerprint.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromIterator<(Fingerprint, usize)> for BkTree {
    fn from_iter<I: IntoIterator<Item = (Fingerprint, usize)>>(iter: I) -> Self {
        let mut tree = BkTree::new();
        for (fingerprint, item) in iter {
            tree.insert(fingerprint, item);
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fp(hex: &str) -> Fingerprint {
        hex.parse().unwrap()
    }

    #[test]
    fn identical_fingerprints_are_all_found() {
        let tree: BkTree = [
            (fp("897fa22ec4991e97"), 0),
            (fp("897fa22ec4991e97"), 1),
            (fp("bf021f177a9760c6"), 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree.len(), 3);

        let mut hits = tree.find(&fp("897fa22ec4991e97"), 0);
        hits.sort();
        assert_eq!(hits, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let tree = BkTree::new();
        assert!(tree.is_empty());
        assert!(tree.find(&fp("0"), 64).is_empty());
    }

    #[test]
    fn matches_linear_scan_on_random_sets() {
        let mut rng = StdRng::seed_from_u64(7);
        let seeds: Vec<u64> = (0..8).map(|_| rng.random()).collect();
        let values: Vec<u64> = (0..300)
            .map(|_| {
                let mut v = seeds[rng.random_range(0..seeds.len())];
                for _ in 0..rng.random_range(0..12) {
                    v ^= 1u64 << rng.random_range(0..64u32);
                }
                v
            })
            .collect();
        let fingerprints: Vec<Fingerprint> =
            values.iter().map(|v| fp(&format!("{:016x}", v))).collect();
        let tree: BkTree = fingerprints.iter().copied().zip(0..).collect();

        for tolerance in [0, 3, 10, 30, 64] {
            for query in fingerprints.iter().step_by(17) {
                let mut from_tree = tree.find(query, tolerance);
                from_tree.sort();
                let expected: Vec<(usize, u32)> = fingerprints
                    .iter()
                    .enumerate()
                    .map(|(i, other)| (i, hamming_distance(query, other)))
                    .filter(|(_, d)| *d <= tolerance)
                    .collect();
                assert_eq!(from_tree, expected);
            }
        }
    }
}
