//! Perceptual Hash Module
//!
//! DCT-based perceptual hash: keep the low-frequency corner of the 2D
//! transform, threshold it against its median and pack the bits into a
//! short hexadecimal fingerprint.

use crate::error::HashingError;
use crate::preprocessor::Grid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// A packed perceptual hash of at most 64 bits.
///
/// The first bit of the coefficient block is the most significant bit of
/// the first byte. Two fingerprints are only comparable when produced with
/// the same grid and coefficient block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    value: u64,
    hex_len: u8,
}

impl Fingerprint {
    /// Packs `bits` MSB-first into bytes. The last byte is zero-padded on
    /// the right when `bits.len()` is not a multiple of eight.
    pub fn from_bits(bits: &[bool]) -> Result<Self, HashingError> {
        if bits.is_empty() || bits.len() > 64 {
            return Err(HashingError::InvalidConfig(format!(
                "fingerprint must hold 1 to 64 bits, got {}",
                bits.len()
            )));
        }
        let bytes = bits.len().div_ceil(8);
        let top = bytes * 8 - 1;
        let value = bits
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .fold(0u64, |acc, (i, _)| acc | 1u64 << (top - i));
        Ok(Fingerprint {
            value,
            hex_len: (bytes * 2) as u8,
        })
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Number of bits that differ between the two fingerprints.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hamming_distance(self, other)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.value, width = self.hex_len as usize)
    }
}

impl FromStr for Fingerprint {
    type Err = HashingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashingError::InvalidFingerprint(s.to_string()));
        }
        let value =
            u64::from_str_radix(s, 16).map_err(|_| HashingError::InvalidFingerprint(s.to_string()))?;
        Ok(Fingerprint {
            value,
            hex_len: s.len() as u8,
        })
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// Hamming distance between two fingerprints, as if both were zero-padded
/// to 64 bits on the most significant side.
pub fn hamming_distance(a: &Fingerprint, b: &Fingerprint) -> u32 {
    (a.value ^ b.value).count_ones()
}

/// Hamming distance between two hex-encoded fingerprints.
pub fn hamming_distance_hex(a: &str, b: &str) -> Result<u32, HashingError> {
    let a: Fingerprint = a.parse()?;
    let b: Fingerprint = b.parse()?;
    Ok(hamming_distance(&a, &b))
}

/// Unnormalized DCT-II basis rows: `2 cos(pi k (2n + 1) / 2N)` for the
/// first `kept` frequencies of an `n`-point transform.
fn dct_basis(n: usize, kept: usize) -> Vec<Vec<f64>> {
    (0..kept)
        .map(|k| {
            (0..n)
                .map(|i| 2.0 * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos())
                .collect()
        })
        .collect()
}

/// Computes the perceptual hash of single-channel grids.
#[derive(Debug, Clone)]
pub struct PerceptualHasher {
    coefficient_extract: (usize, usize),
    grid_size: (usize, usize),
    row_basis: Vec<Vec<f64>>,
    col_basis: Vec<Vec<f64>>,
}

impl PerceptualHasher {
    /// `coefficient_extract` is (rows, cols) of the retained block;
    /// `grid_size` is the (width, height) of the grids that will be hashed.
    pub fn new(coefficient_extract: (usize, usize), grid_size: (u32, u32)) -> Result<Self, HashingError> {
        let (rows, cols) = coefficient_extract;
        let (width, height) = (grid_size.0 as usize, grid_size.1 as usize);
        let bits = rows.checked_mul(cols).unwrap_or(usize::MAX);
        if !(2..=64).contains(&bits) {
            return Err(HashingError::InvalidConfig(format!(
                "coefficient block {}x{} must hold 2 to 64 coefficients",
                rows, cols
            )));
        }
        if rows > height || cols > width {
            return Err(HashingError::InvalidConfig(format!(
                "coefficient block {}x{} does not fit a {}x{} grid",
                rows, cols, width, height
            )));
        }
        Ok(PerceptualHasher {
            coefficient_extract,
            grid_size: (width, height),
            row_basis: dct_basis(height, rows),
            col_basis: dct_basis(width, cols),
        })
    }

    /// Hashes a grayscale grid whose size matches the one given to [`new`].
    ///
    /// [`new`]: PerceptualHasher::new
    pub fn hash(&self, grid: &Grid) -> Result<Fingerprint, HashingError> {
        let block = self.low_frequency_block(grid)?;

        let mut rest = block[1..].to_vec();
        rest.sort_by(f64::total_cmp);
        let mid = rest.len() / 2;
        let median = if rest.len() % 2 == 0 {
            (rest[mid - 1] + rest[mid]) / 2.0
        } else {
            rest[mid]
        };

        let bits: Vec<bool> = block.iter().map(|c| *c >= median).collect();
        Fingerprint::from_bits(&bits)
    }

    /// Top-left corner of the separable 2D DCT, flattened row-major.
    ///
    /// Only the retained frequencies are computed; they are identical to the
    /// corresponding entries of the full transform.
    fn low_frequency_block(&self, grid: &Grid) -> Result<Vec<f64>, HashingError> {
        let (width, height) = self.grid_size;
        if grid.channels != 1 {
            return Err(HashingError::InvalidInputKind(format!(
                "perceptual hash needs a single-channel grid, got {} channels",
                grid.channels
            )));
        }
        if grid.width as usize != width
            || grid.height as usize != height
            || grid.data.len() != width * height
        {
            return Err(HashingError::InvalidInputKind(format!(
                "expected a {}x{} grid, got {}x{}",
                width, height, grid.width, grid.height
            )));
        }
        let (rows, cols) = self.coefficient_extract;

        // Along axis 0 (down each column).
        let mut partial = vec![0.0f64; rows * width];
        for (u, basis) in self.row_basis.iter().enumerate() {
            for (i, weight) in basis.iter().enumerate() {
                let line = &grid.data[i * width..(i + 1) * width];
                for (j, sample) in line.iter().enumerate() {
                    partial[u * width + j] += weight * *sample as f64;
                }
            }
        }

        // Along axis 1 (across each row).
        let mut block = Vec::with_capacity(rows * cols);
        for u in 0..rows {
            let line = &partial[u * width..(u + 1) * width];
            for basis in &self.col_basis {
                block.push(basis.iter().zip(line).map(|(w, x)| w * x).sum::<f64>());
            }
        }
        Ok(block)
    }
}
