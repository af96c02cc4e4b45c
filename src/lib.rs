#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Background Removal Server
//!
//! An HTTP service that removes image backgrounds with pretrained segmentation
//! models (U²-Net, `ISNet`, `BiRefNet`) running on ONNX Runtime.
//!
//! ## Endpoints
//!
//! - `POST /remove-bg`: JSON body with `imageData` (base64 or data URL) or
//!   `imageUrl`, optional `alpha_matting` and `return_format` (`base64` or
//!   `binary`). Returns a transparent PNG.
//! - `GET /health`: model readiness, `503` until the model has loaded
//! - `GET /models`: the model catalog and the model being served
//!
//! ## Architecture
//!
//! A single [`worker::ModelWorker`] thread owns the model and runs one
//! inference at a time. Handlers decode and encode images on Tokio's blocking
//! pool and hand the pixels to the worker through a channel.
//!
//! ## Embedding the server
//!
//! ```rust,no_run
//! use imgly_bgremove_server::{
//!     backends::MockBackend,
//!     processor::{BackgroundRemovalProcessor, BackgroundRemover},
//!     server::{self, AppState},
//!     services::HttpImageFetcher,
//!     worker::ModelWorker,
//!     ServiceConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder().port(8080).build()?;
//! let loader_config = config.clone();
//! let worker = ModelWorker::spawn(move || {
//!     let mut processor = BackgroundRemovalProcessor::new(MockBackend::new());
//!     processor.initialize(&loader_config)?;
//!     Ok(Box::new(processor) as Box<dyn BackgroundRemover>)
//! })?;
//! let fetcher = Arc::new(HttpImageFetcher::from_config(&config)?);
//!
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//! server::serve(listener, AppState::new(config, worker, fetcher)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` support
//! - `cli` (default): the `bgremove-server` binary
//! - `webp-support` (default): WebP input support
//! - `tracing-json`, `tracing-files`: JSON log output and rotating log files

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod worker;

pub use backends::{MockBackend, MockPattern};
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
pub use cache::{format_size, ModelCache};
pub use config::{ExecutionProvider, OversizePolicy, ReturnFormat, ServiceConfig};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, ErrorCategory, FetchFailure, Result};
pub use inference::InferenceBackend;
pub use models::{ModelDescriptor, ModelVariant};
pub use processor::{BackgroundRemovalProcessor, BackgroundRemover};
pub use server::{create_router, AppState};
pub use services::{HttpImageFetcher, ImageCodec, ImageFetcher};
pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput};
pub use types::{ImageResult, RemovalOptions, SegmentationMask};
pub use worker::{ModelStatus, ModelWorker};
