//! HTTP middleware: request IDs and CORS

use crate::tracing_config::spans;
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const ORIGINAL_SIZE_HEADER: HeaderName = HeaderName::from_static("x-original-size");
pub const PROCESSED_SIZE_HEADER: HeaderName = HeaderName::from_static("x-processed-size");
pub const PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-processing-time");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Tag the request with an ID and echo it in the response
///
/// A well-formed incoming `X-Request-ID` is kept; otherwise a UUID v4 is
/// generated.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_valid_request_id(v))
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let span = spans::request(&id, request.method().as_str(), request.uri().path());
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn is_valid_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

/// CORS for the configured origins
///
/// `*` allows any origin; otherwise only the listed origins are echoed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let exposed = [
        REQUEST_ID_HEADER,
        ORIGINAL_SIZE_HEADER,
        PROCESSED_SIZE_HEADER,
        PROCESSING_TIME_HEADER,
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
    ];
    let layer = CorsLayer::new()
        .allow_methods(methods)
        .expose_headers(exposed)
        .max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any).allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                },
            })
            .collect();
        layer
            .allow_origin(origins)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, REQUEST_ID_HEADER])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_validation() {
        assert!(is_valid_request_id("abc-123"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("has space"));
        assert!(!is_valid_request_id(&"x".repeat(MAX_REQUEST_ID_LEN + 1)));
    }
}
