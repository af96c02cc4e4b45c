//! Background removal processor
//!
//! `BackgroundRemovalProcessor` wraps an [`InferenceBackend`] and implements
//! the [`BackgroundRemover`] capability: given a decoded image it returns the
//! same-sized image with an alpha channel derived from the model's mask.

use crate::{
    config::ServiceConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::MaskActivation,
    types::{RemovalOptions, SegmentationMask},
    utils::{matting, ImagePreprocessor, LetterboxGeometry},
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::{Duration, Instant};
use log::{debug, info};
use ndarray::Array4;
use tracing::instrument;

/// Capability to remove the background of a single image
///
/// Implementations are owned by the model worker and called from one thread
/// at a time.
pub trait BackgroundRemover: Send {
    /// Load the model
    ///
    /// Returns the model load time, or `None` if already initialized.
    ///
    /// # Errors
    /// - Model loading failures
    /// - Execution provider setup failures
    fn initialize(&mut self, config: &ServiceConfig) -> Result<Option<Duration>>;

    /// Remove the background from `image`
    ///
    /// The returned image always has the same dimensions as the input.
    ///
    /// # Errors
    /// - Model not initialized
    /// - Preprocessing, inference or mask generation failures
    fn remove_background(
        &mut self,
        image: &DynamicImage,
        options: &RemovalOptions,
    ) -> Result<RgbaImage>;

    /// Name of the model behind this remover
    fn model_name(&self) -> String;

    /// Whether the model is loaded and ready for inference
    fn is_ready(&self) -> bool;
}

/// Background removal processor backed by an inference backend
#[derive(Debug)]
pub struct BackgroundRemovalProcessor<B: InferenceBackend> {
    backend: B,
}

impl<B: InferenceBackend> BackgroundRemovalProcessor<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_initialized()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compute the foreground mask of `image` at its own resolution
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Preprocessing or inference failures
    /// - Unexpected output tensor shape
    pub fn segment(&mut self, image: &DynamicImage) -> Result<SegmentationMask> {
        if !self.backend.is_initialized() {
            return Err(BgRemovalError::model_not_loaded("Backend not initialized"));
        }

        let preprocess_start = Instant::now();
        let preprocessing_config = self.backend.get_preprocessing_config()?;
        let input_tensor =
            ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
        debug!(
            "Preprocessing: {:.2}ms",
            preprocess_start.elapsed().as_secs_f64() * 1000.0
        );

        let inference_start = Instant::now();
        let mut output_tensor = self.backend.infer(&input_tensor)?;
        debug!(
            "Inference: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        apply_activation(&mut output_tensor, self.backend.mask_activation());
        tensor_to_mask(&output_tensor, image.dimensions())
    }
}

impl<B: InferenceBackend> BackgroundRemover for BackgroundRemovalProcessor<B> {
    fn initialize(&mut self, config: &ServiceConfig) -> Result<Option<Duration>> {
        info!("Initializing background removal processor");
        debug!("Execution provider: {}", config.execution_provider);
        let load_time = self.backend.initialize(config)?;
        info!("Background removal processor initialized successfully");
        Ok(load_time)
    }

    #[instrument(
        skip(self, image, options),
        fields(
            dimensions = %format!("{}x{}", image.width(), image.height()),
            alpha_matting = options.alpha_matting
        )
    )]
    fn remove_background(
        &mut self,
        image: &DynamicImage,
        options: &RemovalOptions,
    ) -> Result<RgbaImage> {
        let total_start = Instant::now();

        let mut mask = self.segment(image)?;
        if options.alpha_matting {
            let _span = crate::tracing_config::spans::postprocessing("alpha_matting").entered();
            mask = matting::refine_mask(&mask, options)?;
        }

        let result = apply_background_removal(image, &mask);
        debug!(
            "Background removal: {:.2}ms total",
            total_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn model_name(&self) -> String {
        self.backend
            .get_model_info()
            .map_or_else(|_| "unknown".to_string(), |info| info.name)
    }

    fn is_ready(&self) -> bool {
        self.backend.is_initialized()
    }
}

/// Map raw output values to 0..1 foreground probabilities in place
fn apply_activation(tensor: &mut Array4<f32>, activation: MaskActivation) {
    if activation == MaskActivation::Sigmoid {
        tensor.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    }

    let (min, max) = tensor
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if max - min > f32::EPSILON {
        tensor.mapv_inplace(|v| (v - min) / (max - min));
    } else {
        // Constant output carries no contrast to stretch
        tensor.mapv_inplace(|v| v.clamp(0.0, 1.0));
    }
}

/// Convert output tensor to a mask at the original image resolution
fn tensor_to_mask(tensor: &Array4<f32>, original_dimensions: (u32, u32)) -> Result<SegmentationMask> {
    validate_tensor_shape(tensor)?;

    let shape = tensor.shape();
    let mask_height = shape.get(2).copied().unwrap_or(0) as u32;
    let mask_width = shape.get(3).copied().unwrap_or(0) as u32;
    if mask_width != mask_height {
        return Err(BgRemovalError::processing(format!(
            "Expected square mask tensor, got {mask_width}x{mask_height}"
        )));
    }

    let (orig_width, orig_height) = original_dimensions;
    let geometry = LetterboxGeometry::compute(orig_width, orig_height, mask_width)?;

    let mut mask_data = Vec::with_capacity(orig_width as usize * orig_height as usize);
    for y in 0..orig_height {
        for x in 0..orig_width {
            let (tensor_x, tensor_y) = geometry.to_canvas(x, y);
            let value = tensor
                .get([0, 0, tensor_y as usize, tensor_x as usize])
                .copied()
                .unwrap_or(0.0);
            mask_data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }

    Ok(SegmentationMask::new(mask_data, original_dimensions))
}

fn validate_tensor_shape(tensor: &Array4<f32>) -> Result<()> {
    let shape = tensor.shape();
    if shape.first().copied().unwrap_or(0) != 1 || shape.get(1).copied().unwrap_or(0) != 1 {
        return Err(BgRemovalError::processing(format!(
            "Invalid output tensor shape {shape:?}, expected [1, 1, H, W]"
        )));
    }
    Ok(())
}

/// Apply the mask as alpha channel; fully transparent pixels are zeroed
fn apply_background_removal(image: &DynamicImage, mask: &SegmentationMask) -> RgbaImage {
    let mut result = image.to_rgba8();
    let width = result.width();

    for (x, y, pixel) in result.enumerate_pixels_mut() {
        let pixel_index = (y * width + x) as usize;
        let alpha = mask.data.get(pixel_index).copied().unwrap_or(0);
        // Existing transparency in the input is preserved
        let alpha = ((u16::from(alpha) * u16::from(pixel[3])) / 255) as u8;

        *pixel = if alpha > 0 {
            image::Rgba([pixel[0], pixel[1], pixel[2], alpha])
        } else {
            image::Rgba([0, 0, 0, 0])
        };
    }

    result
}
