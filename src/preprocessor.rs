//! Image Preprocessing Module
//!
//! Turns raw pixel data or encoded image bytes into the fixed-size sample
//! grid the perceptual hash is computed from.

use crate::error::{HashingError, SkipReason};
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;

/// Image formats the loader can be told to accept.
///
/// MPO files carry a JPEG signature and are reported by the decoder as
/// [`ImageKind::Jpeg`]. PGM and PBM files share the PPM family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Bmp,
    Ppm,
    Tiff,
    Gif,
    WebP,
}

impl ImageKind {
    pub const ALL: [ImageKind; 7] = [
        ImageKind::Jpeg,
        ImageKind::Png,
        ImageKind::Bmp,
        ImageKind::Ppm,
        ImageKind::Tiff,
        ImageKind::Gif,
        ImageKind::WebP,
    ];

    /// Maps a decoder format onto the allow-list vocabulary.
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Bmp => Some(ImageKind::Bmp),
            ImageFormat::Pnm => Some(ImageKind::Ppm),
            ImageFormat::Tiff => Some(ImageKind::Tiff),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::Bmp => "BMP",
            ImageKind::Ppm => "PPM",
            ImageKind::Tiff => "TIFF",
            ImageKind::Gif => "GIF",
            ImageKind::WebP => "WEBP",
        };
        f.write_str(name)
    }
}

/// Interleaved 8-bit samples supplied directly by a caller.
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub width: u32,
    pub height: u32,
    /// 1 (luma), 2 (luma + alpha), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    pub data: Vec<u8>,
}

impl RawPixels {
    fn into_dynamic(self) -> Result<DynamicImage, HashingError> {
        if self.width == 0 || self.height == 0 {
            return Err(HashingError::InvalidInputKind(format!(
                "pixel grid has a zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.data.len() != expected {
            return Err(HashingError::InvalidInputKind(format!(
                "pixel grid of {}x{}x{} needs {} bytes, got {}",
                self.width,
                self.height,
                self.channels,
                expected,
                self.data.len()
            )));
        }

        let (w, h, data) = (self.width, self.height, self.data);
        let image = match self.channels {
            1 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            other => {
                return Err(HashingError::InvalidInputKind(format!(
                    "unsupported channel count {}",
                    other
                )));
            }
        };
        image.ok_or_else(|| HashingError::InvalidInputKind("pixel buffer rejected".into()))
    }
}

/// What [`preprocess`] accepts: a bare pixel grid or an already decoded image.
pub enum ImageInput<'a> {
    Pixels(RawPixels),
    Decoded(&'a DynamicImage),
}

/// A resized, row-major grid of 8-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

/// Resizes `input` to `target_size` (width, height) with a Lanczos filter and
/// optionally reduces it to a single luma channel.
///
/// The resize always happens, even when the input already has the target
/// size. Without `grayscale` the grid keeps one channel for luma input and
/// three (RGB) for everything else.
pub fn preprocess(
    input: ImageInput<'_>,
    target_size: (u32, u32),
    grayscale: bool,
) -> Result<Grid, HashingError> {
    let (width, height) = target_size;
    if width == 0 || height == 0 {
        return Err(HashingError::InvalidConfig(format!(
            "target size {}x{} has a zero dimension",
            width, height
        )));
    }

    let image: Cow<'_, DynamicImage> = match input {
        ImageInput::Pixels(raw) => Cow::Owned(raw.into_dynamic()?),
        ImageInput::Decoded(image) => Cow::Borrowed(image),
    };
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);

    let grid = if grayscale {
        Grid {
            width,
            height,
            channels: 1,
            data: luma_samples(&resized),
        }
    } else if matches!(resized.color(), ColorType::L8 | ColorType::L16) {
        Grid {
            width,
            height,
            channels: 1,
            data: resized.to_luma8().into_raw(),
        }
    } else {
        Grid {
            width,
            height,
            channels: 3,
            data: resized.to_rgb8().into_raw(),
        }
    };
    Ok(grid)
}

/// ITU-R 601-2 luma in 16-bit fixed point.
fn luma_samples(image: &DynamicImage) -> Vec<u8> {
    image
        .to_rgb8()
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
            l as u8
        })
        .collect()
}

/// Decodes encoded image bytes into hash-ready grayscale grids.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    target_size: (u32, u32),
    allowed_formats: Vec<ImageKind>,
}

impl ImageLoader {
    pub fn new(target_size: (u32, u32), allowed_formats: Vec<ImageKind>) -> Self {
        ImageLoader {
            target_size,
            allowed_formats,
        }
    }

    /// Loads one buffer. Every failure is soft: the caller gets a reason,
    /// never an error.
    pub fn load(&self, bytes: &[u8]) -> Result<Grid, SkipReason> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| SkipReason::DecodeFailure(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| SkipReason::DecodeFailure("unrecognized image data".into()))?;
        match ImageKind::from_format(format) {
            Some(kind) if self.allowed_formats.contains(&kind) => {}
            Some(kind) => return Err(SkipReason::UnsupportedFormat(kind.to_string())),
            None => return Err(SkipReason::UnsupportedFormat(format!("{:?}", format).to_uppercase())),
        }

        let mut image = reader
            .decode()
            .map_err(|e| SkipReason::DecodeFailure(e.to_string()))?;
        if image.color() != ColorType::Rgb8 {
            // RGBA first so palette and alpha images normalize the same way;
            // the alpha channel is dropped, not composited.
            image = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.to_rgba8()).to_rgb8());
        }

        preprocess(ImageInput::Decoded(&image), self.target_size, true)
            .map_err(|e| SkipReason::DecodeFailure(e.to_string()))
    }
}
