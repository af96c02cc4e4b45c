//! `/health`, `/models` and cross-cutting HTTP behavior

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::*;
use imgly_bgremove_server::{
    BackgroundRemovalProcessor, BackgroundRemover, BgRemovalError, MockBackend, ModelVariant,
    ModelWorker, ServiceConfig,
};

#[tokio::test]
async fn test_health_reports_ready_model() {
    let app = ready_app(test_config(), MockBackend::new()).await;

    let (status, json) = call_json(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["model"], "u2net");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["model_load_seconds"].as_f64().unwrap() >= 0.0);
    assert!(json.get("error").is_none());
    assert!(chrono::DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_health_reports_loading_then_ready() {
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let worker = ModelWorker::spawn(move || {
        let _ = release_rx.recv();
        let mut processor = BackgroundRemovalProcessor::new(MockBackend::new());
        processor.initialize(&ServiceConfig::default())?;
        Ok(Box::new(processor) as Box<dyn BackgroundRemover>)
    })
    .unwrap();
    let app = app_with_worker(test_config(), worker.clone(), StaticFetcher::default());

    let (status, json) = call_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "loading");
    assert_eq!(json["model_loaded"], false);

    release_tx.send(()).unwrap();
    assert!(worker.wait_until_settled().await.is_ready());

    let (status, json) = call_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["model_loaded"], true);
}

#[tokio::test]
async fn test_health_reports_failed_load() {
    let worker =
        ModelWorker::spawn(|| Err(BgRemovalError::model("weights are missing"))).unwrap();
    worker.wait_until_settled().await;
    let app = app_with_worker(test_config(), worker, StaticFetcher::default());

    let (status, json) = call_json(&app, get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["model_loaded"], false);
    assert!(json["error"].as_str().unwrap().contains("weights are missing"));
}

#[tokio::test]
async fn test_models_lists_catalog_and_current_model() {
    let config = ServiceConfig::builder()
        .model(ModelVariant::IsnetGeneralUse)
        .build()
        .unwrap();
    let app = ready_app(config, MockBackend::new()).await;

    let (status, json) = call_json(&app, get("/models")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current"], "isnet-general-use");
    let names: Vec<&str> = json["available"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), ModelVariant::ALL.len());
    assert!(names.contains(&"u2net"));
    assert!(names.contains(&"u2netp"));
    assert!(names.contains(&"isnet-general-use"));
    assert!(json["available"][0]["description"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = ready_app(test_config(), MockBackend::new()).await;
    let response = send(&app, get("/remove-background")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let app = ready_app(test_config(), MockBackend::new()).await;

    let response = send(&app, get("/health")).await;

    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = ready_app(test_config(), MockBackend::new()).await;
    let request = Request::builder()
        .uri("/models")
        .header("x-request-id", "client-trace-42")
        .body(Body::empty())
        .unwrap();

    let response = send(&app, request).await;

    assert_eq!(response.headers()["x-request-id"], "client-trace-42");
}

#[tokio::test]
async fn test_request_id_on_error_responses() {
    let app = ready_app(test_config(), MockBackend::new()).await;

    let response = send(&app, post_json("/remove-bg", &serde_json::json!({}))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("x-request-id"));
}

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/remove-bg")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = ready_app(test_config(), MockBackend::new()).await;

    let response = send(&app, preflight("https://anywhere.example")).await;

    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let config = ServiceConfig::builder()
        .allowed_origins(vec!["https://app.example".to_string()])
        .build()
        .unwrap();
    let app = ready_app(config, MockBackend::new()).await;

    let allowed = send(&app, preflight("https://app.example")).await;
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example"
    );

    let denied = send(&app, preflight("https://evil.example")).await;
    assert!(!denied
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
