//! Configuration types for the background removal service
//!
//! [`ServiceConfig`] is read once at startup, validated by its builder, and
//! shared immutably for the lifetime of the process.

use crate::error::{BgRemovalError, Result};
use crate::models::ModelVariant;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 2048;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FETCH_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const MIN_IMAGE_SIZE: u32 = 32;
const MAX_IMAGE_SIZE_LIMIT: u32 = 16_384;
const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// What to do with images larger than the configured maximum dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Scale down so the longer side equals the maximum, keeping aspect ratio
    #[default]
    Downscale,
    /// Reject the request with a client error
    Reject,
}

impl std::fmt::Display for OversizePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downscale => write!(f, "downscale"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for OversizePolicy {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "downscale" | "resize" => Ok(Self::Downscale),
            "reject" => Ok(Self::Reject),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown oversize policy '{other}' (expected downscale or reject)"
            ))),
        }
    }
}

/// Response encoding for a successful removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnFormat {
    /// JSON body with a `data:image/png;base64,...` URL
    #[default]
    Base64,
    /// Raw PNG bytes
    Binary,
}

impl FromStr for ReturnFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base64" => Ok(Self::Base64),
            "binary" => Ok(Self::Binary),
            other => Err(BgRemovalError::invalid_request(format!(
                "Unknown return_format '{other}' (expected 'base64' or 'binary')"
            ))),
        }
    }
}

/// Process-wide service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Interface to bind
    pub host: IpAddr,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Segmentation model served by this process
    pub model: ModelVariant,
    /// Maximum width or height of an image handed to the model
    pub max_image_size: u32,
    /// Behaviour for images over `max_image_size`
    pub oversize_policy: OversizePolicy,
    /// CORS origins; a single `*` allows any origin
    pub allowed_origins: Vec<String>,
    /// Verbose logging
    pub debug: bool,
    /// Timeout for remote image fetches
    pub fetch_timeout: Duration,
    /// Maximum payload size of a remote image
    pub max_fetch_bytes: usize,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Directory holding model weights (None = user cache directory)
    pub model_dir: Option<PathBuf>,
    /// Expected SHA-256 of the model file, hex encoded
    pub model_sha256: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            model: ModelVariant::default(),
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            oversize_policy: OversizePolicy::default(),
            allowed_origins: vec!["*".to_string()],
            debug: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            model_dir: None,
            model_sha256: None,
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Address the HTTP listener binds to
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether CORS should allow any origin
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - Values outside of their supported ranges
    /// - Empty origin list
    /// - Malformed SHA-256 pin
    pub fn validate(&self) -> Result<()> {
        if !(MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE_LIMIT).contains(&self.max_image_size) {
            return Err(BgRemovalError::config_value_error(
                "max image size",
                self.max_image_size,
                "32-16384",
                Some(DEFAULT_MAX_IMAGE_SIZE),
            ));
        }

        if self.fetch_timeout.is_zero() || self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(BgRemovalError::config_value_error(
                "fetch timeout (seconds)",
                self.fetch_timeout.as_secs(),
                "1-600",
                Some(DEFAULT_FETCH_TIMEOUT.as_secs()),
            ));
        }

        if self.max_fetch_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max fetch bytes",
                self.max_fetch_bytes,
                "> 0",
                Some(DEFAULT_MAX_FETCH_BYTES),
            ));
        }

        if self.max_body_bytes < 1024 {
            return Err(BgRemovalError::config_value_error(
                "max body bytes",
                self.max_body_bytes,
                ">= 1024",
                Some(DEFAULT_MAX_BODY_BYTES),
            ));
        }

        if self.allowed_origins.is_empty() {
            return Err(BgRemovalError::invalid_config(
                "At least one allowed origin is required (use '*' to allow any)",
            ));
        }

        if let Some(hash) = &self.model_sha256 {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgRemovalError::invalid_config(format!(
                    "Model SHA-256 must be 64 hex characters, got '{hash}'"
                )));
            }
        }

        Ok(())
    }
}

/// Split a comma separated origin list, dropping blanks
#[must_use]
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelVariant) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn max_image_size(mut self, size: u32) -> Self {
        self.config.max_image_size = size;
        self
    }

    #[must_use]
    pub fn oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.config.oversize_policy = policy;
        self
    }

    #[must_use]
    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.allowed_origins = origins;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_fetch_bytes(mut self, bytes: usize) -> Self {
        self.config.max_fetch_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn model_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.model_dir = dir;
        self
    }

    #[must_use]
    pub fn model_sha256(mut self, hash: Option<String>) -> Self {
        self.config.model_sha256 = hash.map(|h| h.trim().to_ascii_lowercase());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any value rejected by [`ServiceConfig::validate`]
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
