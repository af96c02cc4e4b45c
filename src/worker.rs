//! Model worker
//!
//! A single OS thread owns the [`BackgroundRemover`]. It loads the model once,
//! publishes its readiness through a watch channel and then executes removal
//! jobs strictly one at a time. Async callers talk to it through a cloneable
//! [`ModelWorker`] handle and never touch the model directly.

use crate::{
    error::{BgRemovalError, Result},
    processor::BackgroundRemover,
    tracing_config::spans,
    types::RemovalOptions,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

/// Jobs that may wait for the worker before callers are back-pressured
const JOB_QUEUE_CAPACITY: usize = 32;

/// Produces the remover on the worker thread
pub type RemoverLoader = Box<dyn FnOnce() -> Result<Box<dyn BackgroundRemover>> + Send>;

/// Readiness of the model owned by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    /// The loader is still running
    Loading,
    /// The model is loaded and accepting jobs
    Ready { load_time: Duration },
    /// The loader failed; the worker rejects every job
    Failed(String),
}

impl ModelStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

struct Job {
    image: DynamicImage,
    options: RemovalOptions,
    reply: oneshot::Sender<Result<RgbaImage>>,
}

/// Handle to the model worker thread
#[derive(Debug, Clone)]
pub struct ModelWorker {
    jobs: mpsc::Sender<Job>,
    status: watch::Receiver<ModelStatus>,
}

impl ModelWorker {
    /// Spawn the worker thread and start loading the model
    ///
    /// Returns immediately; the status stays [`ModelStatus::Loading`] until
    /// `loader` finishes.
    ///
    /// # Errors
    /// - The OS refused to spawn the thread
    pub fn spawn<F>(loader: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn BackgroundRemover>> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ModelStatus::Loading);

        std::thread::Builder::new()
            .name("model-worker".to_string())
            .spawn(move || run(Box::new(loader), job_rx, &status_tx))
            .map_err(|e| BgRemovalError::internal(format!("Failed to spawn model worker: {e}")))?;

        Ok(Self {
            jobs: job_tx,
            status: status_rx,
        })
    }

    /// Current model status
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ModelStatus> {
        self.status.clone()
    }

    /// Wait until the loader has either succeeded or failed
    pub async fn wait_until_settled(&self) -> ModelStatus {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if current != ModelStatus::Loading {
                return current;
            }
            if status.changed().await.is_err() {
                return status.borrow().clone();
            }
        }
    }

    /// Run one background removal on the worker
    ///
    /// # Errors
    /// - [`BgRemovalError::ModelNotLoaded`] while loading or after a failed load
    /// - Any error raised by the remover, including caught panics
    pub async fn remove(&self, image: DynamicImage, options: RemovalOptions) -> Result<RgbaImage> {
        match self.status() {
            ModelStatus::Ready { .. } => {},
            ModelStatus::Loading => {
                return Err(BgRemovalError::model_not_loaded("Model is still loading"));
            },
            ModelStatus::Failed(reason) => {
                return Err(BgRemovalError::model_not_loaded(format!(
                    "Model failed to load: {reason}"
                )));
            },
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            image,
            options,
            reply: reply_tx,
        };
        self.jobs
            .send(job)
            .await
            .map_err(|_| BgRemovalError::internal("Model worker has stopped"))?;

        reply_rx
            .await
            .map_err(|_| BgRemovalError::internal("Model worker dropped the job"))?
    }
}

fn run(
    loader: RemoverLoader,
    mut jobs: mpsc::Receiver<Job>,
    status: &watch::Sender<ModelStatus>,
) {
    let load_start = Instant::now();
    let loaded = catch_unwind(AssertUnwindSafe(loader)).unwrap_or_else(|payload| {
        Err(BgRemovalError::model(format!(
            "Model loader panicked: {}",
            panic_message(payload.as_ref())
        )))
    });

    let mut remover = match loaded {
        Ok(remover) => {
            let load_time = load_start.elapsed();
            info!(
                model = %remover.model_name(),
                load_ms = load_time.as_millis() as u64,
                "Model ready"
            );
            status.send_replace(ModelStatus::Ready { load_time });
            remover
        },
        Err(e) => {
            error!(error = %e, "Model failed to load");
            status.send_replace(ModelStatus::Failed(e.to_string()));
            while let Some(job) = jobs.blocking_recv() {
                let _ = job
                    .reply
                    .send(Err(BgRemovalError::model_not_loaded(format!(
                        "Model failed to load: {e}"
                    ))));
            }
            return;
        },
    };

    let model_name = remover.model_name();
    while let Some(job) = jobs.blocking_recv() {
        let span = spans::inference(&model_name, job.image.dimensions());
        let _entered = span.enter();

        let result = catch_unwind(AssertUnwindSafe(|| {
            remover.remove_background(&job.image, &job.options)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Model panicked during inference");
            Err(BgRemovalError::inference(format!(
                "Model panicked during inference: {message}"
            )))
        });

        if job.reply.send(result).is_err() {
            debug!("Caller went away before the result was ready");
        }
    }
    debug!("Job channel closed, model worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::config::ServiceConfig;
    use crate::processor::BackgroundRemovalProcessor;
    use image::{ImageBuffer, Rgb};

    fn loaded(backend: MockBackend) -> Result<Box<dyn BackgroundRemover>> {
        let mut processor = BackgroundRemovalProcessor::new(backend);
        processor.initialize(&ServiceConfig::default())?;
        Ok(Box::new(processor))
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(16, 12, Rgb([10, 200, 10])))
    }

    #[tokio::test]
    async fn test_ready_worker_processes_jobs() {
        let worker = ModelWorker::spawn(|| loaded(MockBackend::new())).unwrap();
        assert!(worker.wait_until_settled().await.is_ready());

        let result = worker.remove(image(), RemovalOptions::default()).await.unwrap();
        assert_eq!(result.dimensions(), (16, 12));
    }

    #[tokio::test]
    async fn test_loading_status_until_loader_returns() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let worker = ModelWorker::spawn(move || {
            let _ = release_rx.recv();
            loaded(MockBackend::new())
        })
        .unwrap();

        assert_eq!(worker.status(), ModelStatus::Loading);
        let err = worker
            .remove(image(), RemovalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "model_not_loaded");

        release_tx.send(()).unwrap();
        assert!(worker.wait_until_settled().await.is_ready());
        assert!(worker.remove(image(), RemovalOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_loader_is_reported() {
        let worker = ModelWorker::spawn(|| loaded(MockBackend::failing_init())).unwrap();

        match worker.wait_until_settled().await {
            ModelStatus::Failed(reason) => assert!(!reason.is_empty()),
            other => panic!("expected failure, got {other:?}"),
        }
        let err = worker
            .remove(image(), RemovalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "model_not_loaded");
    }

    #[tokio::test]
    async fn test_worker_survives_panics() {
        let worker = ModelWorker::spawn(|| {
            loaded(MockBackend::new().panicking_inference(2))
        })
        .unwrap();
        worker.wait_until_settled().await;

        for _ in 0..2 {
            let err = worker
                .remove(image(), RemovalOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "inference_error");
            assert!(err.to_string().contains("mock inference panic"));
        }

        assert!(worker.remove(image(), RemovalOptions::default()).await.is_ok());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
