//! Background removal HTTP server
//!
//! Parses flags and environment variables, starts the model worker and serves
//! the HTTP API until Ctrl+C or SIGTERM.

use super::{backend_factory::CliBackendFactory, config::CliConfigBuilder};
use crate::{
    cache::ModelCache,
    config::{
        ExecutionProvider, OversizePolicy, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_FETCH_BYTES,
        DEFAULT_MAX_IMAGE_SIZE, DEFAULT_PORT,
    },
    download::ModelDownloader,
    models::ModelVariant,
    server::{self, AppState},
    services::HttpImageFetcher,
    tracing_config::TracingFormat,
    worker::ModelWorker,
};
use anyhow::{Context, Result};
use clap::{builder::FalseyValueParser, Parser};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Background removal HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-server")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Segmentation model to serve
    #[arg(short, long, env = "REMBG_MODEL", default_value_t = ModelVariant::default())]
    pub model: ModelVariant,

    /// Maximum width or height handed to the model
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: u32,

    /// What to do with larger images (downscale, reject)
    #[arg(long, env = "OVERSIZE_POLICY", default_value_t = OversizePolicy::default())]
    pub oversize_policy: OversizePolicy,

    /// Comma separated CORS origins, or "*"
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*")]
    pub allowed_origins: String,

    /// Enable debug logging
    #[arg(long, env = "DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Increase log verbosity (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (console, compact, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Write logs to this file (rotated daily) instead of stdout
    #[cfg(feature = "tracing-files")]
    #[arg(long, env = "LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Timeout for remote image fetches, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// Maximum size of a remote image, in bytes
    #[arg(long, env = "MAX_FETCH_BYTES", default_value_t = DEFAULT_MAX_FETCH_BYTES)]
    pub max_fetch_bytes: usize,

    /// Maximum size of a request body, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// ONNX Runtime execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, env = "EXECUTION_PROVIDER", default_value_t = ExecutionProvider::default())]
    pub execution_provider: ExecutionProvider,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, env = "INFERENCE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Directory holding model weights [default: user cache directory]
    #[arg(long, env = "MODEL_DIR", value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Expected SHA-256 of the model file
    #[arg(long, env = "MODEL_SHA256", value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List the model catalog and exit
    #[arg(long)]
    pub list_models: bool,

    /// Download the configured model and exit
    #[arg(long)]
    pub only_download: bool,
}

pub async fn main() -> Result<()> {
    // Environment must be populated before clap reads it
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let _tracing_guard = CliConfigBuilder::tracing_from_cli(&cli)
        .init()
        .context("Failed to initialize tracing")?;
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.list_models {
        list_models();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli)?;
    let cache = ModelCache::from_override(config.model_dir.as_deref())
        .context("Failed to prepare model directory")?;
    let downloader = ModelDownloader::new(cache).context("Failed to create model downloader")?;

    if cli.only_download {
        let path = downloader
            .ensure_model(config.model, config.model_sha256.as_deref())
            .await
            .with_context(|| format!("Failed to download model '{}'", config.model))?;
        println!("{}", path.display());
        return Ok(());
    }

    info!(
        model = %config.model,
        provider = %config.execution_provider,
        max_image_size = config.max_image_size,
        oversize_policy = %config.oversize_policy,
        model_dir = %downloader.cache().cache_dir().display(),
        "Starting background removal server"
    );
    if config.allows_any_origin() {
        warn!("CORS allows any origin");
    }

    let factory = CliBackendFactory::new(config.clone(), downloader);
    let worker = ModelWorker::spawn(move || factory.create_remover())
        .context("Failed to start model worker")?;
    let fetcher = Arc::new(
        HttpImageFetcher::from_config(&config).context("Failed to create image fetcher")?,
    );

    let listener = tokio::net::TcpListener::bind(config.socket_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.socket_addr()))?;

    server::serve(listener, AppState::new(config, worker, fetcher))
        .await
        .context("Server failed")?;
    Ok(())
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\nExecution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  {name}: {status} - {description}");
        }
    }
    #[cfg(not(feature = "onnx"))]
    println!("\nNo inference backend compiled in (enable the 'onnx' feature)");

    println!("\nSelect one with --execution-provider auto|cpu|cuda|coreml");
}

fn list_models() {
    let default = ModelVariant::default();
    for variant in ModelVariant::ALL {
        let marker = if variant == default { " (default)" } else { "" };
        println!("{:<24} {}{marker}", variant.name(), variant.description());
    }
}
