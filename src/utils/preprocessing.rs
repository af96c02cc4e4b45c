//! Image preprocessing for model inference
//!
//! Images are letterboxed: resized with their aspect ratio preserved and
//! centered on a padded square canvas of the model's input size. The same
//! [`LetterboxGeometry`] is used afterwards to map the output mask back onto
//! the original image.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
        }
    }
}

/// Placement of a resized image on the square model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    /// Scale factor from original to canvas pixels
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    /// Canvas side length
    pub target_size: u32,
}

impl LetterboxGeometry {
    /// Compute placement of a `width` x `height` image on a `target_size` canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    pub fn compute(width: u32, height: u32, target_size: u32) -> Result<Self> {
        if width == 0 || height == 0 || target_size == 0 {
            return Err(BgRemovalError::processing(format!(
                "Cannot letterbox {width}x{height} onto a {target_size}px canvas"
            )));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);

        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            target_size,
        })
    }

    /// Canvas coordinate for an original image coordinate
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> (u32, u32) {
        let scaled_x = ((x as f32 + 0.5) * self.scale - 0.5).round().max(0.0) as u32;
        let scaled_y = ((y as f32 + 0.5) * self.scale - 0.5).round().max(0.0) as u32;
        (
            scaled_x.min(self.scaled_width - 1) + self.offset_x,
            scaled_y.min(self.scaled_height - 1) + self.offset_y,
        )
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// Converts to RGB, letterboxes onto the target canvas and normalizes
    /// into an NCHW tensor.
    ///
    /// # Errors
    /// - Zero-sized input image
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size[0];
        let rgb_image = image.to_rgb8();
        let (orig_width, orig_height) = rgb_image.dimensions();
        let geometry = LetterboxGeometry::compute(orig_width, orig_height, target_size)?;

        let _span = crate::tracing_config::spans::preprocessing(
            (orig_width, orig_height),
            (geometry.scaled_width, geometry.scaled_height),
        )
        .entered();

        let resized = image::imageops::resize(
            &rgb_image,
            geometry.scaled_width,
            geometry.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = options.padding_color;
        let mut canvas = ImageBuffer::from_pixel(
            target_size,
            target_size,
            image::Rgb([padding[0], padding[1], padding[2]]),
        );
        image::imageops::overlay(
            &mut canvas,
            &resized,
            i64::from(geometry.offset_x),
            i64::from(geometry.offset_y),
        );

        Ok(Self::canvas_to_tensor(&canvas, preprocessing_config))
    }

    /// Preprocess with default options
    ///
    /// # Errors
    /// - Zero-sized input image
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            let pixel = canvas.get_pixel(x as u32, y as u32);
            let value = f32::from(pixel.0.get(c).copied().unwrap_or(0)) / 255.0;
            let channel_mean = mean.get(c).copied().unwrap_or(0.0);
            let channel_std = std.get(c).copied().unwrap_or(1.0);
            (value - channel_mean) / channel_std
        })
    }
}
