//! ONNX Runtime backend implementation for background removal models
//!
//! Loads one model variant from disk into an ONNX Runtime session with the
//! configured execution provider (CPU, CUDA, `CoreML`) and runs it.

use crate::config::{ExecutionProvider, ServiceConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{MaskActivation, ModelInfo, ModelVariant, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::path::{Path, PathBuf};

/// ONNX Runtime backend for running background removal models
#[derive(Debug)]
pub struct OnnxBackend {
    variant: ModelVariant,
    model_path: PathBuf,
    model_size: usize,
    session: Option<Session>,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability status
    ///
    /// Returns (name, available, description) tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a backend for `variant` whose weights live at `model_path`
    #[must_use]
    pub fn new(variant: ModelVariant, model_path: impl Into<PathBuf>) -> Self {
        Self {
            variant,
            model_path: model_path.into(),
            model_size: 0,
            session: None,
            initialized: false,
        }
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Execution providers to register for the requested provider
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false)
        };

        match requested {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    vec![CUDAExecutionProvider::default().build()]
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    vec![CoreMLExecutionProvider::default().with_subgraphs(true).build()]
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
        }
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &ServiceConfig) -> Result<std::time::Duration> {
        let model_load_start = std::time::Instant::now();

        let model_data = std::fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model", &self.model_path, &e))?;
        if model_data.is_empty() {
            return Err(BgRemovalError::model(format!(
                "Model file '{}' is empty",
                self.model_path.display()
            )));
        }

        let mut session_builder = Session::builder()
            .map_err(|e| BgRemovalError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgRemovalError::model(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgRemovalError::model(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(8)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to create session from model data: {e}"))
            })?;

        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_data.len() as f64 / (1024.0 * 1024.0);
        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Threading: {intra_threads} intra-op threads");
        log::debug!("  - Model: {} ({size_mb:.2} MB)", self.variant);

        self.model_size = model_data.len();
        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &ServiceConfig) -> Result<Option<std::time::Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        use std::time::Instant;

        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs: the variants disagree on tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        // The first output is the finest-resolution mask for every variant
        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        let output_data = output_tensor.view().to_owned();

        let (batch, channels, height, width) = match output_shape.as_slice() {
            [n, c, h, w] => (*n, *c, *h, *w),
            [n, h, w] => (*n, 1, *h, *w),
            other => {
                return Err(BgRemovalError::inference(format!(
                    "Expected 3D or 4D output tensor, got {}D",
                    other.len()
                )))
            },
        };

        let result = Array4::from_shape_vec(
            (batch, channels, height, width),
            output_data.into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgRemovalError::processing(format!("Failed to reshape output tensor: {e}")))?;

        log::info!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(result)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.variant.preprocessing_config())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.variant.model_info(self.model_size))
    }

    fn mask_activation(&self) -> MaskActivation {
        self.variant.mask_activation()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
