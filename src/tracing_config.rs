//! Tracing configuration for structured logging
//!
//! The server binary configures the subscriber; library code only emits
//! events and spans. `log` records from dependencies are bridged into the
//! same subscriber.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable console output with colors
    #[default]
    Console,
    /// Compact console output without colors, for log collectors
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "pretty" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            #[cfg(not(feature = "tracing-json"))]
            "json" => Err("JSON logging requires the 'tracing-json' feature".to_string()),
            other => Err(format!(
                "Unknown log format '{other}' (expected console, compact or json)"
            )),
        }
    }
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Output to stdout (default)
    #[default]
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Instance ID attached to the startup event
    pub instance_id: Option<String>,
}

/// Keeps background log writers alive; drop it only at shutdown
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Raise verbosity to at least debug when `debug` is set
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.verbosity = self.verbosity.max(1);
        }
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn with_instance_id<S: Into<String>>(mut self, instance_id: S) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info,tower_http=info",
            1 => "debug,hyper=info,reqwest=info",
            _ => "trace",
        }
    }

    /// Initialize the global tracing subscriber
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };

        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer().with_ansi(false).with_target(true).compact();
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::daily(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("bgremove-server.log")),
                );
                let (file_writer, file_guard) = non_blocking(file_appender);
                guard._file_guard = Some(file_guard);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let fmt_layer = fmt::layer()
                            .with_ansi(false)
                            .with_writer(file_writer)
                            .compact();
                        registry.with(fmt_layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let fmt_layer = fmt::layer()
                            .json()
                            .with_writer(file_writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(fmt_layer).try_init()?;
                    },
                }
            },
        }

        if let Some(instance_id) = &self.instance_id {
            tracing::info!(instance_id = %instance_id, "Tracing initialized");
        }

        Ok(guard)
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for one HTTP request
    pub fn request(request_id: &str, method: &str, path: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "request",
            request_id = %request_id,
            method = %method,
            path = %path
        )
    }

    /// Span for model loading operations
    pub fn model_loading(model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_name = %model_name,
            provider = %provider
        )
    }

    /// Span for one removal job on the model worker
    pub fn inference(model_name: &str, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "inference",
            model_name = %model_name,
            width = %dimensions.0,
            height = %dimensions.1
        )
    }

    /// Span for remote image fetches
    pub fn fetch(url: &str) -> Span {
        tracing::span!(Level::INFO, "fetch", url = %url)
    }

    /// Span for model download operations
    pub fn download(url: &str, destination: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "download",
            url = %url,
            destination = %destination.display()
        )
    }

    /// Span for preprocessing operations
    pub fn preprocessing(original_size: (u32, u32), target_size: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "preprocessing",
            original_width = %original_size.0,
            original_height = %original_size.1,
            target_width = %target_size.0,
            target_height = %target_size.1
        )
    }

    /// Span for postprocessing operations
    pub fn postprocessing(operation: &str) -> Span {
        tracing::span!(
            Level::DEBUG,
            "postprocessing",
            operation = %operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert!(TracingConfig::new().verbosity_to_filter().starts_with("info"));
        assert!(TracingConfig::new()
            .with_verbosity(1)
            .verbosity_to_filter()
            .starts_with("debug"));
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_debug_flag_raises_verbosity() {
        assert_eq!(TracingConfig::new().with_debug(true).verbosity, 1);
        assert_eq!(TracingConfig::new().with_debug(false).verbosity, 0);
        assert_eq!(
            TracingConfig::new().with_verbosity(2).with_debug(true).verbosity,
            2
        );
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_format(TracingFormat::Compact)
            .with_env_filter("warn")
            .with_instance_id("abc");

        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("warn"));
        assert_eq!(config.instance_id.as_deref(), Some("abc"));
        assert_eq!(config.output, TracingOutput::Console);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("console".parse::<TracingFormat>().unwrap(), TracingFormat::Console);
        assert_eq!("COMPACT".parse::<TracingFormat>().unwrap(), TracingFormat::Compact);
        assert!("xml".parse::<TracingFormat>().is_err());
    }
}
