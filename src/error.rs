//! Error Types
//!
//! Hard failures abort a call and surface as [`HashingError`]. Per-image
//! problems never do: they are recorded as a [`SkipReason`] next to the
//! image name and the batch carries on.

use thiserror::Error;

/// Highest Hamming distance two 64-bit fingerprints can have.
pub const MAX_THRESHOLD: u32 = 64;

/// Errors that abort an engine call.
#[derive(Debug, Error)]
pub enum HashingError {
    /// Preprocessing was handed something that is not a usable pixel grid.
    #[error("Invalid input: {0}")]
    InvalidInputKind(String),

    #[error("Threshold must be an int between 0 and 64, got {0}")]
    InvalidThreshold(u32),

    /// The worker pool could not be built, even after one restart.
    #[error("Failed to start a pool of {workers} workers: {reason}")]
    PoolStartFailure { workers: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid fingerprint '{0}'")]
    InvalidFingerprint(String),
}

/// Why a single image was left out of a fingerprint table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("Invalid image format {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image file: {0}")]
    DecodeFailure(String),
}

/// Checks that `threshold` is a usable Hamming distance bound.
pub fn check_threshold(threshold: u32) -> Result<u32, HashingError> {
    if threshold > MAX_THRESHOLD {
        return Err(HashingError::InvalidThreshold(threshold));
    }
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds_are_inclusive() {
        assert_eq!(check_threshold(0).unwrap(), 0);
        assert_eq!(check_threshold(64).unwrap(), 64);
        assert!(matches!(
            check_threshold(65),
            Err(HashingError::InvalidThreshold(65))
        ));
    }

    #[test]
    fn skip_reasons_render_for_logs() {
        let reason = SkipReason::DecodeFailure("truncated".into());
        assert_eq!(reason.to_string(), "Invalid image file: truncated");
    }
}
