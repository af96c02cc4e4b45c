//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{parse_origins, ServiceConfig},
    tracing_config::TracingConfig,
};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to the service configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build and validate a [`ServiceConfig`] from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        ServiceConfig::builder()
            .host(cli.host)
            .port(cli.port)
            .model(cli.model)
            .max_image_size(cli.max_image_size)
            .oversize_policy(cli.oversize_policy)
            .allowed_origins(parse_origins(&cli.allowed_origins))
            .debug(cli.debug)
            .fetch_timeout(Duration::from_secs(cli.fetch_timeout_secs))
            .max_fetch_bytes(cli.max_fetch_bytes)
            .max_body_bytes(cli.max_body_bytes)
            .execution_provider(cli.execution_provider)
            .intra_threads(cli.threads)
            .model_dir(cli.model_dir.clone())
            .model_sha256(cli.model_sha256.clone())
            .build()
            .context("Invalid configuration")
    }

    /// Tracing setup for the server
    ///
    /// `RUST_LOG` takes precedence over `--debug` and `-v`.
    pub(crate) fn tracing_from_cli(cli: &Cli) -> TracingConfig {
        let mut tracing = TracingConfig::new()
            .with_verbosity(cli.verbose)
            .with_debug(cli.debug)
            .with_format(cli.log_format)
            .with_instance_id(uuid::Uuid::new_v4().to_string());

        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                tracing = tracing.with_env_filter(filter);
            }
        }

        #[cfg(feature = "tracing-files")]
        if let Some(path) = &cli.log_file {
            tracing = tracing.with_output(crate::tracing_config::TracingOutput::File(path.clone()));
        }

        tracing
    }
}
