//! Deterministic in-process backend
//!
//! `MockBackend` implements [`InferenceBackend`] without ONNX Runtime so the
//! processor, the model worker and the HTTP layer can be exercised without
//! model files. Its output is a fixed pattern and it can be told to fail.

use crate::{
    config::ServiceConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Shape of the mask produced by the mock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPattern {
    /// Every pixel has the same foreground probability
    Uniform(f32),
    /// Foreground square covering the central half of the input
    CenteredSquare,
}

/// How the mock should misbehave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    None,
    Init,
    /// Fail this many inference calls, then succeed
    Inference(usize),
    /// Panic on this many inference calls, then succeed
    Panic(usize),
}

/// Mock backend for tests
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    input_size: u32,
    pattern: MockPattern,
    failure: FailureMode,
    inference_calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Mock that classifies every pixel as foreground
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            input_size: 64,
            pattern: MockPattern::Uniform(1.0),
            failure: FailureMode::None,
            inference_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: MockPattern) -> Self {
        self.pattern = pattern;
        self
    }

    #[must_use]
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size.max(1);
        self
    }

    /// Mock that fails during initialization
    #[must_use]
    pub fn failing_init() -> Self {
        Self {
            failure: FailureMode::Init,
            ..Self::new()
        }
    }

    /// Fail the next `count` inference calls with an error
    #[must_use]
    pub fn failing_inference(mut self, count: usize) -> Self {
        self.failure = FailureMode::Inference(count);
        self
    }

    /// Panic on the next `count` inference calls
    #[must_use]
    pub fn panicking_inference(mut self, count: usize) -> Self {
        self.failure = FailureMode::Panic(count);
        self
    }

    /// Shared counter of inference calls, readable after the mock moved
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.inference_calls)
    }

    fn generate_output(&self) -> Array4<f32> {
        let size = self.input_size as usize;
        match self.pattern {
            MockPattern::Uniform(value) => Array4::from_elem((1, 1, size, size), value),
            MockPattern::CenteredSquare => {
                let start = size / 4;
                let end = size - size / 4;
                Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
                    if (start..end).contains(&x) && (start..end).contains(&y) {
                        1.0
                    } else {
                        0.0
                    }
                })
            },
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ServiceConfig) -> Result<Option<Duration>> {
        if self.failure == FailureMode::Init {
            return Err(BgRemovalError::model("Mock initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        self.inference_calls.fetch_add(1, Ordering::SeqCst);

        match self.failure {
            FailureMode::Inference(remaining) if remaining > 0 => {
                self.failure = FailureMode::Inference(remaining - 1);
                return Err(BgRemovalError::inference("Mock inference failure"));
            },
            FailureMode::Panic(remaining) if remaining > 0 => {
                self.failure = FailureMode::Panic(remaining - 1);
                panic!("mock inference panic");
            },
            _ => {},
        }

        let expected = self.input_size as usize;
        let shape = input.shape();
        if shape != [1, 3, expected, expected] {
            return Err(BgRemovalError::processing(format!(
                "Expected input shape [1, 3, {expected}, {expected}], got {shape:?}"
            )));
        }

        Ok(self.generate_output())
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [self.input_size, self.input_size],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let size = self.input_size as usize;
        Ok(ModelInfo {
            name: "mock".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(backend: MockBackend) -> MockBackend {
        let mut backend = backend;
        backend.initialize(&ServiceConfig::default()).unwrap();
        backend
    }

    #[test]
    fn test_infer_requires_initialization() {
        let mut backend = MockBackend::new();
        assert!(backend.infer(&Array4::zeros((1, 3, 64, 64))).is_err());
    }

    #[test]
    fn test_failing_init() {
        let mut backend = MockBackend::failing_init();
        let err = backend.initialize(&ServiceConfig::default()).unwrap_err();
        assert_eq!(err.code(), "model_error");
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_failures_are_consumed() {
        let mut backend = ready(MockBackend::new().failing_inference(1));
        let input = Array4::zeros((1, 3, 64, 64));
        assert!(backend.infer(&input).is_err());
        assert!(backend.infer(&input).is_ok());
        assert_eq!(backend.call_counter().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_centered_square_pattern() {
        let mut backend = ready(
            MockBackend::new()
                .with_input_size(8)
                .with_pattern(MockPattern::CenteredSquare),
        );
        let output = backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(output[[0, 0, 4, 4]], 1.0);
        assert_eq!(output[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_rejects_wrong_input_shape() {
        let mut backend = ready(MockBackend::new());
        let err = backend.infer(&Array4::zeros((1, 3, 10, 10))).unwrap_err();
        assert_eq!(err.code(), "processing_error");
    }
}
