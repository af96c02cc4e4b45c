//! Builds the background remover the model worker owns

use crate::{
    config::ServiceConfig,
    download::ModelDownloader,
    error::Result,
    processor::BackgroundRemover,
    tracing_config::spans,
};
use tokio::runtime::Handle;

/// Creates the remover for the configured model on the worker thread
#[derive(Debug, Clone)]
pub(crate) struct CliBackendFactory {
    config: ServiceConfig,
    downloader: ModelDownloader,
    runtime: Handle,
}

impl CliBackendFactory {
    /// Must be called from within the Tokio runtime
    pub(crate) fn new(config: ServiceConfig, downloader: ModelDownloader) -> Self {
        Self {
            config,
            downloader,
            runtime: Handle::current(),
        }
    }

    /// Download the weights if needed and load them into ONNX Runtime
    ///
    /// Blocks the calling thread; run it on the model worker.
    #[cfg(feature = "onnx")]
    pub(crate) fn create_remover(self) -> Result<Box<dyn BackgroundRemover>> {
        use crate::{backends::OnnxBackend, processor::BackgroundRemovalProcessor};

        let provider = self.config.execution_provider.to_string();
        let span = spans::model_loading(self.config.model.name(), &provider);
        let _entered = span.enter();

        let model_path = self.runtime.block_on(
            self.downloader
                .ensure_model(self.config.model, self.config.model_sha256.as_deref()),
        )?;

        let mut processor =
            BackgroundRemovalProcessor::new(OnnxBackend::new(self.config.model, model_path));
        if let Some(load_time) = processor.initialize(&self.config)? {
            log::info!("Session created in {:.2}s", load_time.as_secs_f64());
        }
        Ok(Box::new(processor))
    }

    #[cfg(not(feature = "onnx"))]
    pub(crate) fn create_remover(self) -> Result<Box<dyn BackgroundRemover>> {
        let _span = spans::model_loading(self.config.model.name(), "none").entered();
        let _ = (&self.downloader, &self.runtime);
        Err(crate::error::BgRemovalError::model(
            "No inference backend compiled in; rebuild with the 'onnx' feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ModelCache;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_model_file_fails_to_load() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        std::fs::write(
            cache.model_path(crate::models::ModelVariant::U2netp),
            b"not an onnx model",
        )
        .unwrap();
        let config = ServiceConfig::builder()
            .model(crate::models::ModelVariant::U2netp)
            .model_dir(Some(temp_dir.path().to_path_buf()))
            .build()
            .unwrap();
        let factory = CliBackendFactory::new(config, ModelDownloader::new(cache).unwrap());

        let result = tokio::task::spawn_blocking(move || factory.create_remover().map(|_| ()))
            .await
            .unwrap();
        assert!(result.is_err());
    }
}
