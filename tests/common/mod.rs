//! Shared helpers for the HTTP integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
use imgly_bgremove_server::{
    error::Result, services::fetch::validate_url, AppState, BackgroundRemovalProcessor,
    BackgroundRemover, ImageFetcher, MockBackend, ModelWorker, ServiceConfig,
};
use std::io::Cursor;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tower::ServiceExt;

/// Worker that loads `backend` through the real processor
pub fn spawn_worker(backend: MockBackend) -> ModelWorker {
    ModelWorker::spawn(move || {
        let mut processor = BackgroundRemovalProcessor::new(backend);
        processor.initialize(&ServiceConfig::default())?;
        Ok(Box::new(processor) as Box<dyn BackgroundRemover>)
    })
    .expect("spawn model worker")
}

/// Router around `worker`, with a fetcher that serves `remote`
pub fn app_with_worker(config: ServiceConfig, worker: ModelWorker, remote: StaticFetcher) -> Router {
    imgly_bgremove_server::create_router(AppState::new(config, worker, Arc::new(remote)))
}

/// Router whose model has finished loading
pub async fn ready_app(config: ServiceConfig, backend: MockBackend) -> Router {
    let worker = spawn_worker(backend);
    assert!(worker.wait_until_settled().await.is_ready());
    app_with_worker(config, worker, StaticFetcher::default())
}

/// Default configuration for tests
pub fn test_config() -> ServiceConfig {
    ServiceConfig::builder()
        .build()
        .expect("default test configuration")
}

/// Fetcher that answers every valid URL with the same bytes
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    body: Vec<u8>,
    calls: Arc<AtomicUsize>,
    last_url: Arc<Mutex<Option<String>>>,
}

impl StaticFetcher {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = validate_url(url)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(url.to_string());
        Ok(self.body.clone())
    }
}

/// PNG of a solid opaque square
pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgb([220_u8, 40, 40]));
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

/// PNG with an alpha channel
pub fn translucent_png(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgba([20_u8, 40, 220, 128]));
    encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgb([30_u8, 160, 90]));
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode fixture");
    bytes
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn bare_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode the PNG behind a `data:image/png;base64,` URL
pub fn decode_data_url(url: &str) -> DynamicImage {
    let payload = url
        .strip_prefix("data:image/png;base64,")
        .expect("PNG data URL prefix");
    let bytes = STANDARD.decode(payload).expect("valid base64 payload");
    image::load_from_memory_with_format(&bytes, ImageFormat::Png).expect("decodable PNG")
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    let body = body.to_string();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Send one request through the router
pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

/// Send a request and return status plus parsed JSON body
pub async fn call_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = send(app, request).await;
    let status = response.status();
    (status, body_json(response).await)
}
