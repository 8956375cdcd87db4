//! phash-dedup - Core Library
//!
//! Perceptual hashing and near-duplicate detection for in-memory image
//! buffers. Images are hashed into 64-bit DCT fingerprints, compared by
//! Hamming distance, and reduced to a list of redundant names.
//!
//! ```no_run
//! use phash_dedup::{Config, ImageDeduper, NamedImage};
//!
//! # fn main() -> Result<(), phash_dedup::HashingError> {
//! let deduper = ImageDeduper::new(Config::default())?;
//! let images = vec![
//!     NamedImage::new("a.jpg", std::fs::read("a.jpg").unwrap()),
//!     NamedImage::new("b.jpg", std::fs::read("b.jpg").unwrap()),
//! ];
//! let report = deduper.encode_images(&images)?;
//! let duplicates = deduper.find_duplicates(&report.fingerprints, 10, true)?;
//! let to_remove = deduper.find_duplicates_to_remove(&report.fingerprints, 10)?;
//! # Ok(())
//! # }
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

pub mod bktree;
pub mod error;
pub mod evaluator;
pub mod hash_encoder;
pub mod perceptual_hash;
pub mod preprocessor;
pub mod resolver;
pub mod runner;
pub mod scheduler;

pub use error::{HashingError, SkipReason};
pub use evaluator::{Duplicate, DuplicateMap, HashEvaluator, SearchMethod};
pub use hash_encoder::{EncodeReport, FingerprintTable, HashEncoder, NamedImage, SkippedImage};
pub use perceptual_hash::{Fingerprint, PerceptualHasher, hamming_distance, hamming_distance_hex};
pub use preprocessor::{Grid, ImageInput, ImageKind, ImageLoader, RawPixels, preprocess};
pub use resolver::resolve;
pub use scheduler::Scheduler;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// (width, height) every image is resized to before hashing.
    pub target_size: (u32, u32),
    /// (rows, cols) of low-frequency DCT coefficients kept in the hash.
    pub coefficient_extract: (usize, usize),
    pub allowed_formats: Vec<ImageKind>,
    /// 0 or 1 hashes on the calling thread.
    pub encode_workers: usize,
    /// 0 or 1 evaluates distances on the calling thread.
    pub distance_workers: usize,
    pub threshold: u32,
    pub search_method: SearchMethod,
    pub with_scores: bool,
    /// Show progress bars for the batch phases.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let cores = num_cpus::get();
        Config {
            target_size: (32, 32),
            coefficient_extract: (8, 8),
            allowed_formats: ImageKind::ALL.to_vec(),
            encode_workers: cores,
            distance_workers: cores,
            threshold: 10,
            search_method: SearchMethod::BruteForce,
            with_scores: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Rejects settings that can never produce or compare fingerprints.
    pub fn validate(&self) -> Result<(), HashingError> {
        let (width, height) = self.target_size;
        if width == 0 || height == 0 {
            return Err(HashingError::InvalidConfig(format!(
                "target size {}x{} has a zero dimension",
                width, height
            )));
        }
        if self.allowed_formats.is_empty() {
            return Err(HashingError::InvalidConfig("no image formats allowed".into()));
        }
        PerceptualHasher::new(self.coefficient_extract, self.target_size)?;
        error::check_threshold(self.threshold)?;
        Ok(())
    }
}

/// Entry point tying the encoder, evaluator and resolver together.
#[derive(Debug, Clone)]
pub struct ImageDeduper {
    config: Config,
    encoder: HashEncoder,
}

impl ImageDeduper {
    pub fn new(config: Config) -> Result<Self, HashingError> {
        config.validate()?;
        debug!("Image deduper configured: {:?}", config);
        let encoder = HashEncoder::new(&config)?;
        Ok(ImageDeduper { config, encoder })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fingerprints every image; unreadable ones are listed in
    /// [`EncodeReport::skipped`].
    pub fn encode_images(&self, images: &[NamedImage]) -> Result<EncodeReport, HashingError> {
        self.encoder.encode(images)
    }

    /// Fingerprint of a single buffer, or `None` if it could not be loaded.
    pub fn hash_image(&self, bytes: &[u8]) -> Option<Fingerprint> {
        self.encoder.encode_one(bytes).ok()
    }

    /// The grayscale grid the hash of `bytes` is computed from.
    pub fn load_image(&self, bytes: &[u8]) -> Result<Grid, SkipReason> {
        ImageLoader::new(self.config.target_size, self.config.allowed_formats.clone()).load(bytes)
    }

    pub fn preprocess_image(
        &self,
        input: ImageInput<'_>,
        grayscale: bool,
    ) -> Result<Grid, HashingError> {
        preprocess(input, self.config.target_size, grayscale)
    }

    /// Duplicates of every entry of `table` within the same table.
    pub fn find_duplicates(
        &self,
        table: &FingerprintTable,
        threshold: u32,
        with_scores: bool,
    ) -> Result<DuplicateMap, HashingError> {
        self.find_duplicates_between(table, table, threshold, with_scores)
    }

    /// Duplicates of every entry of `queries` among `corpus`.
    pub fn find_duplicates_between(
        &self,
        corpus: &FingerprintTable,
        queries: &FingerprintTable,
        threshold: u32,
        with_scores: bool,
    ) -> Result<DuplicateMap, HashingError> {
        let evaluator = HashEvaluator::new(corpus, queries, threshold, self.config.search_method)?
            .verbose(self.config.verbose);
        let scheduler = Scheduler::new(self.config.distance_workers)?;
        Ok(evaluator.evaluate(&scheduler, with_scores))
    }

    /// Names that can be removed so that one image of every duplicate group
    /// remains. See [`resolve`] for which one survives.
    pub fn find_duplicates_to_remove(
        &self,
        table: &FingerprintTable,
        threshold: u32,
    ) -> Result<Vec<String>, HashingError> {
        let duplicates = self.find_duplicates(table, threshold, false)?;
        Ok(resolve(&duplicates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search_method, SearchMethod::BruteForce);
        assert_eq!(config.threshold, 10);
        assert_eq!(config.allowed_formats.len(), 7);
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let config = Config {
            coefficient_extract: (40, 40),
            ..Config::default()
        };
        assert!(matches!(
            ImageDeduper::new(config),
            Err(HashingError::InvalidConfig(_))
        ));

        let config = Config {
            target_size: (0, 32),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overflowing_block_from_json_is_rejected() {
        let config: Config =
            serde_json::from_str(r#"{"coefficient_extract": [4294967296, 4294967297]}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(HashingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_threshold_is_bounded() {
        let config = Config {
            threshold: 70,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HashingError::InvalidThreshold(70))
        ));
    }

    #[test]
    fn partial_json_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"search_method": "bktree", "allowed_formats": ["png", "jpeg"]}"#)
                .unwrap();
        assert_eq!(config.search_method, SearchMethod::BkTree);
        assert_eq!(config.allowed_formats, vec![ImageKind::Png, ImageKind::Jpeg]);
        assert_eq!(config.target_size, (32, 32));
    }

    #[test]
    fn removal_list_from_hex_table() {
        let deduper = ImageDeduper::new(Config {
            distance_workers: 1,
            ..Config::default()
        })
        .unwrap();
        let table = FingerprintTable::from_hex_pairs([
            ("IMG_1231_1.JPG", "ca4d8bca6bc36595"),
            ("IMG_1233.JPG", "bf021f177a9760c6"),
            ("IMG_1232.JPG", "bf785f137e0660c4"),
            ("IMG_1231.JPG", "ca4d8bca6bc36595"),
            ("Image1.jpg", "897fa22ec4991e97"),
            ("Image2.jpg", "897fa22ec4991e97"),
        ])
        .unwrap();

        let duplicates = deduper.find_duplicates(&table, 10, false).unwrap();
        assert_eq!(duplicates.matched_names("IMG_1231_1.JPG"), vec!["IMG_1231.JPG"]);
        assert!(duplicates.matched_names("IMG_1233.JPG").is_empty());
        assert!(duplicates.matched_names("IMG_1232.JPG").is_empty());
        assert_eq!(duplicates.matched_names("Image2.jpg"), vec!["Image1.jpg"]);

        let to_remove = deduper.find_duplicates_to_remove(&table, 10).unwrap();
        assert_eq!(to_remove, vec!["IMG_1231.JPG", "Image2.jpg"]);
    }
}
