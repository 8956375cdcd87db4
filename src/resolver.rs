//! Duplicate Set Resolution
//!
//! Reduces a duplicate map to the list of names that can be dropped while
//! keeping one representative of every group of duplicates.

use crate::evaluator::{Duplicate, DuplicateMap};
use std::collections::HashSet;

/// Names to remove, in the order they were first marked.
///
/// Queries are visited in the map's insertion order, which is the order of
/// the fingerprint table and therefore of the images given to the encoder.
/// A query that has not been marked yet keeps its place and marks all of
/// its matches, so the earliest image of each group survives.
pub fn resolve(duplicates: &DuplicateMap) -> Vec<String> {
    let mut marked: HashSet<&str> = HashSet::new();
    let mut to_remove = Vec::new();

    for (query, matches) in duplicates.iter() {
        if marked.contains(query) {
            continue;
        }
        for name in matches.iter().map(Duplicate::name) {
            if marked.insert(name) {
                to_remove.push(name.to_string());
            }
        }
    }
    to_remove
}
