//! Shared application state

use crate::{
    config::ServiceConfig,
    services::{ImageCodec, ImageFetcher},
    worker::ModelWorker,
};
use std::sync::Arc;
use std::time::Instant;

/// State handed to every request handler
///
/// Everything here is either immutable or owned by the model worker, so
/// cloning per request is cheap and needs no locking.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub worker: ModelWorker,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub codec: ImageCodec,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServiceConfig, worker: ModelWorker, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let codec = ImageCodec::from_config(&config);
        Self {
            config: Arc::new(config),
            worker,
            fetcher,
            codec,
            started_at: Instant::now(),
        }
    }
}
