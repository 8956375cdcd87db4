//! Distance Evaluation Module
//!
//! Finds, for every query fingerprint, the corpus entries within a Hamming
//! distance threshold. Queries are independent, so each one is a unit of
//! work for the scheduler.

use crate::bktree::BkTree;
use crate::error::{HashingError, check_threshold};
use crate::hash_encoder::FingerprintTable;
use crate::perceptual_hash::{Fingerprint, hamming_distance};
use crate::scheduler::{Scheduler, progress_bar};
use log::{debug, info};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// How candidate matches are retrieved. Both strategies return the same
/// matches; they only differ in how many distances get computed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum SearchMethod {
    /// Compare every query against every corpus entry.
    #[default]
    #[serde(rename = "brute_force")]
    #[value(name = "brute_force")]
    BruteForce,
    /// Index the corpus in a BK-tree and prune by the triangle inequality.
    #[serde(rename = "bktree")]
    #[value(name = "bktree")]
    BkTree,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::BruteForce => write!(f, "brute_force"),
            SearchMethod::BkTree => write!(f, "bktree"),
        }
    }
}

/// One retrieved duplicate, with or without its distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Duplicate {
    Name(String),
    Scored(String, u32),
}

impl Duplicate {
    pub fn name(&self) -> &str {
        match self {
            Duplicate::Name(name) | Duplicate::Scored(name, _) => name,
        }
    }

    pub fn distance(&self) -> Option<u32> {
        match self {
            Duplicate::Name(_) => None,
            Duplicate::Scored(_, distance) => Some(*distance),
        }
    }
}

/// Query name to its duplicates, closest first, in query insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicateMap {
    entries: Vec<(String, Vec<Duplicate>)>,
    index: HashMap<String, usize>,
}

impl DuplicateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the duplicates of `query`, keeping its original position if it
    /// was already present.
    pub fn insert(&mut self, query: impl Into<String>, duplicates: Vec<Duplicate>) {
        let query = query.into();
        if let Some(&slot) = self.index.get(&query) {
            self.entries[slot].1 = duplicates;
            return;
        }
        self.index.insert(query.clone(), self.entries.len());
        self.entries.push((query, duplicates));
    }

    pub fn get(&self, query: &str) -> Option<&[Duplicate]> {
        self.index
            .get(query)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    /// Names matched for `query`, closest first.
    pub fn matched_names(&self, query: &str) -> Vec<&str> {
        self.get(query)
            .map(|dups| dups.iter().map(Duplicate::name).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Duplicate])> {
        self.entries
            .iter()
            .map(|(query, dups)| (query.as_str(), dups.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for DuplicateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// A configured search of `queries` against `corpus`.
pub struct HashEvaluator<'a> {
    corpus: &'a FingerprintTable,
    queries: &'a FingerprintTable,
    threshold: u32,
    method: SearchMethod,
    verbose: bool,
}

impl<'a> HashEvaluator<'a> {
    /// Fails with [`HashingError::InvalidThreshold`] when `threshold` > 64.
    pub fn new(
        corpus: &'a FingerprintTable,
        queries: &'a FingerprintTable,
        threshold: u32,
        method: SearchMethod,
    ) -> Result<Self, HashingError> {
        Ok(HashEvaluator {
            corpus,
            queries,
            threshold: check_threshold(threshold)?,
            method,
            verbose: false,
        })
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Runs the search. A query never matches a corpus entry of the same
    /// name. Matches are sorted by distance, ties broken by corpus order.
    pub fn evaluate(&self, scheduler: &Scheduler, with_scores: bool) -> DuplicateMap {
        info!(
            "Start: Evaluating hamming distances for {} queries against {} images ({}, threshold {})",
            self.queries.len(),
            self.corpus.len(),
            self.method,
            self.threshold
        );

        let corpus: Vec<(&str, &Fingerprint)> = self.corpus.iter().collect();
        let queries: Vec<(&str, &Fingerprint)> = self.queries.iter().collect();
        let progress = progress_bar(queries.len(), self.verbose, "Evaluating distances");
        let threshold = self.threshold;
        debug!("Evaluating distances on {} worker(s)", scheduler.workers());

        let hits = match self.method {
            SearchMethod::BruteForce => scheduler.map(&queries, &progress, |&(name, fingerprint)| {
                brute_force(name, fingerprint, &corpus, threshold)
            }),
            SearchMethod::BkTree => {
                let tree: BkTree = corpus
                    .iter()
                    .enumerate()
                    .map(|(slot, (_, fingerprint))| (**fingerprint, slot))
                    .collect();
                scheduler.map(&queries, &progress, |&(name, fingerprint)| {
                    tree_search(name, fingerprint, &corpus, &tree, threshold)
                })
            }
        };
        progress.finish_and_clear();

        let mut result = DuplicateMap::new();
        for (&(query, _), matches) in queries.iter().zip(hits) {
            let duplicates = matches
                .into_iter()
                .map(|(slot, distance)| {
                    let name = corpus[slot].0.to_string();
                    if with_scores {
                        Duplicate::Scored(name, distance)
                    } else {
                        Duplicate::Name(name)
                    }
                })
                .collect();
            result.insert(query, duplicates);
        }

        info!("End: Evaluating hamming distances for getting duplicates");
        result
    }
}

fn brute_force(
    query: &str,
    fingerprint: &Fingerprint,
    corpus: &[(&str, &Fingerprint)],
    threshold: u32,
) -> Vec<(usize, u32)> {
    let mut matches: Vec<(usize, u32)> = corpus
        .iter()
        .enumerate()
        .filter(|(_, (name, _))| *name != query)
        .map(|(slot, (_, other))| (slot, hamming_distance(fingerprint, other)))
        .filter(|&(_, distance)| distance <= threshold)
        .collect();
    matches.sort_by_key(|&(_, distance)| distance);
    matches
}

fn tree_search(
    query: &str,
    fingerprint: &Fingerprint,
    corpus: &[(&str, &Fingerprint)],
    tree: &BkTree,
    threshold: u32,
) -> Vec<(usize, u32)> {
    let mut matches: Vec<(usize, u32)> = tree
        .find(fingerprint, threshold)
        .into_iter()
        .filter(|&(slot, _)| corpus[slot].0 != query)
        .collect();
    matches.sort_by_key(|&(slot, distance)| (distance, slot));
    matches
}
