//! Inference backend abstraction

use crate::{
    config::ServiceConfig,
    error::Result,
    models::{MaskActivation, ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend owns a loaded model and turns a normalized NCHW input tensor
/// into a single-channel output tensor. Backends are driven from the model
/// worker thread only, so they need to be `Send` but not `Sync`.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model loading time, or `None` if already initialized.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model loading or validation errors
    fn initialize(&mut self, config: &ServiceConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion or processing errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Invalid or missing preprocessing configuration
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable or invalid
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// How raw output values map to foreground probability
    fn mask_activation(&self) -> MaskActivation {
        MaskActivation::MinMax
    }

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn initialize(&mut self, config: &ServiceConfig) -> Result<Option<Duration>> {
        (**self).initialize(config)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        (**self).infer(input)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        (**self).get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        (**self).get_model_info()
    }

    fn mask_activation(&self) -> MaskActivation {
        (**self).mask_activation()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;

    #[test]
    fn test_boxed_backend_delegates() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::new());
        assert!(!backend.is_initialized());

        let load_time = backend.initialize(&ServiceConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());

        // second initialize is a no-op
        assert!(backend.initialize(&ServiceConfig::default()).unwrap().is_none());

        let config = backend.get_preprocessing_config().unwrap();
        let size = config.target_size[0] as usize;
        let output = backend
            .infer(&Array4::zeros((1, 3, size, size)))
            .unwrap();
        assert_eq!(output.shape(), &[1, 1, size, size]);
        assert_eq!(backend.mask_activation(), MaskActivation::MinMax);
    }
}
