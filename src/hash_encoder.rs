//! Hash Encoding Module
//!
//! Maps a batch of named image buffers to fingerprints. Images that cannot
//! be loaded are reported next to the table instead of failing the batch.

use crate::Config;
use crate::error::{HashingError, SkipReason};
use crate::perceptual_hash::{Fingerprint, PerceptualHasher};
use crate::preprocessor::ImageLoader;
use crate::scheduler::{Scheduler, progress_bar};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use uuid::Uuid;

/// An encoded image and the name it is reported under.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        NamedImage {
            name: name.into(),
            bytes,
        }
    }
}

/// Name to fingerprint mapping that remembers insertion order.
///
/// Names are unique: inserting an existing name replaces its fingerprint
/// without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FingerprintTable {
    entries: Vec<(String, Fingerprint)>,
    index: HashMap<String, usize>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from hex strings, e.g. one previously serialized.
    pub fn from_hex_pairs<I, N, H>(pairs: I) -> Result<Self, HashingError>
    where
        I: IntoIterator<Item = (N, H)>,
        N: Into<String>,
        H: AsRef<str>,
    {
        let mut table = Self::new();
        for (name, hex) in pairs {
            table.insert(name, hex.as_ref().parse()?);
        }
        Ok(table)
    }

    /// Returns the fingerprint previously stored under `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, fingerprint: Fingerprint) -> Option<Fingerprint> {
        let name = name.into();
        if let Some(&slot) = self.index.get(&name) {
            let previous = std::mem::replace(&mut self.entries[slot].1, fingerprint);
            return Some(previous);
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, fingerprint));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.index.get(name).map(|&slot| &self.entries[slot].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fingerprint)> {
        self.entries.iter().map(|(name, fp)| (name.as_str(), fp))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl<N: Into<String>> FromIterator<(N, Fingerprint)> for FingerprintTable {
    fn from_iter<I: IntoIterator<Item = (N, Fingerprint)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, fingerprint) in iter {
            table.insert(name, fingerprint);
        }
        table
    }
}

impl Serialize for FingerprintTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// An image that was left out of the table, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub name: String,
    pub reason: SkipReason,
}

/// Everything one encoding call produced.
#[derive(Debug, Clone, Default)]
pub struct EncodeReport {
    pub fingerprints: FingerprintTable,
    pub skipped: Vec<SkippedImage>,
}

/// Loads and hashes batches of images, optionally on a worker pool.
#[derive(Debug, Clone)]
pub struct HashEncoder {
    loader: ImageLoader,
    hasher: PerceptualHasher,
    workers: usize,
    verbose: bool,
}

impl HashEncoder {
    pub fn new(config: &Config) -> Result<Self, HashingError> {
        Ok(HashEncoder {
            loader: ImageLoader::new(config.target_size, config.allowed_formats.clone()),
            hasher: PerceptualHasher::new(config.coefficient_extract, config.target_size)?,
            workers: config.encode_workers,
            verbose: config.verbose,
        })
    }

    /// Overrides the worker count from the config.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Hashes one buffer.
    pub fn encode_one(&self, bytes: &[u8]) -> Result<Fingerprint, SkipReason> {
        let grid = self.loader.load(bytes)?;
        self.hasher
            .hash(&grid)
            .map_err(|e| SkipReason::DecodeFailure(e.to_string()))
    }

    /// Hashes every image in `images`.
    ///
    /// Unnamed images get a random identifier. The only error is a worker
    /// pool that cannot be started.
    pub fn encode(&self, images: &[NamedImage]) -> Result<EncodeReport, HashingError> {
        info!("Start: Calculating hashes for {} images...", images.len());

        let scheduler = Scheduler::new(self.workers)?;
        debug!("Hashing on {} worker(s)", scheduler.workers());
        let progress = progress_bar(images.len(), self.verbose, "Hashing images");
        let outcomes = scheduler.map(images, &progress, |image| self.encode_one(&image.bytes));
        progress.finish_and_clear();

        let mut report = EncodeReport::default();
        for (image, outcome) in images.iter().zip(outcomes) {
            let name = if image.name.is_empty() {
                Uuid::new_v4().simple().to_string()
            } else {
                image.name.clone()
            };
            match outcome {
                Ok(fingerprint) => {
                    report.fingerprints.insert(name, fingerprint);
                }
                Err(reason) => {
                    warn!("Skipping image '{}': {}", name, reason);
                    report.skipped.push(SkippedImage { name, reason });
                }
            }
        }

        info!(
            "Finished calculating hashes: {} hashed, {} skipped.",
            report.fingerprints.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
