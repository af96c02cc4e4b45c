//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (GPU acceleration via CUDA or `CoreML`)
//! - Mock backend (deterministic output, used by tests and local development)

pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::mock::{MockBackend, MockPattern};
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;
