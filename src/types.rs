//! Core types shared by the processor, the worker and the HTTP layer

use crate::error::{BgRemovalError, Result};
use image::{GrayImage, RgbaImage};
use std::time::Duration;

pub const DEFAULT_FOREGROUND_THRESHOLD: u8 = 240;
pub const DEFAULT_BACKGROUND_THRESHOLD: u8 = 10;
pub const DEFAULT_ERODE_SIZE: u32 = 10;
const MAX_ERODE_SIZE: u32 = 64;

/// Per-request removal options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOptions {
    /// Refine mask edges with alpha matting
    pub alpha_matting: bool,
    /// Mask values at or above this are sure foreground
    pub foreground_threshold: u8,
    /// Mask values at or below this are sure background
    pub background_threshold: u8,
    /// Side length of the square used to erode the sure regions
    pub erode_size: u32,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            alpha_matting: true,
            foreground_threshold: DEFAULT_FOREGROUND_THRESHOLD,
            background_threshold: DEFAULT_BACKGROUND_THRESHOLD,
            erode_size: DEFAULT_ERODE_SIZE,
        }
    }
}

impl RemovalOptions {
    /// Validate matting parameters
    ///
    /// # Errors
    /// - Background threshold not below the foreground threshold
    /// - Erode size above the supported maximum
    pub fn validate(&self) -> Result<()> {
        if self.background_threshold >= self.foreground_threshold {
            return Err(BgRemovalError::invalid_request(format!(
                "alpha_matting_background_threshold ({}) must be lower than alpha_matting_foreground_threshold ({})",
                self.background_threshold, self.foreground_threshold
            )));
        }
        if self.erode_size > MAX_ERODE_SIZE {
            return Err(BgRemovalError::invalid_request(format!(
                "alpha_matting_erode_size must be at most {MAX_ERODE_SIZE}, got {}",
                self.erode_size
            )));
        }
        Ok(())
    }
}

/// Single-channel foreground mask at image resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Row-major alpha values
    pub data: Vec<u8>,
    /// (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// View the mask as a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::processing(format!(
                "Mask buffer of {} bytes does not match {width}x{height}",
                self.data.len()
            ))
        })
    }

    #[must_use]
    pub fn from_image(image: GrayImage) -> Self {
        let dimensions = image.dimensions();
        Self {
            data: image.into_raw(),
            dimensions,
        }
    }

    /// Fraction of pixels with non-zero alpha
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let visible = self.data.iter().filter(|&&v| v > 0).count();
        visible as f32 / self.data.len() as f32
    }
}

/// Outcome of a single removal request
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// Output image with alpha channel
    pub image: RgbaImage,
    /// Size of the decoded input, before any downscaling
    pub original_dimensions: (u32, u32),
    /// Size of the image given to the model and returned to the caller
    pub processed_dimensions: (u32, u32),
    /// Time spent from request start until the result was produced
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RemovalOptions::default();
        assert!(options.alpha_matting);
        assert_eq!(options.foreground_threshold, 240);
        assert_eq!(options.background_threshold, 10);
        assert_eq!(options.erode_size, 10);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_thresholds() {
        let options = RemovalOptions {
            foreground_threshold: 10,
            background_threshold: 10,
            ..RemovalOptions::default()
        };
        assert_eq!(options.validate().unwrap_err().code(), "invalid_request");

        let options = RemovalOptions {
            erode_size: 500,
            ..RemovalOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_mask_image_conversion() {
        let mask = SegmentationMask::new(vec![0, 255, 128, 0], (2, 2));
        let image = mask.to_image().unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [255]);
        assert_eq!(SegmentationMask::from_image(image), mask);
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);

        let broken = SegmentationMask::new(vec![0; 3], (2, 2));
        assert!(broken.to_image().is_err());
    }
}
