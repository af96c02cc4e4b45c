//! Request handlers for `/remove-bg`, `/health` and `/models`

use super::{
    middleware::{ORIGINAL_SIZE_HEADER, PROCESSED_SIZE_HEADER, PROCESSING_TIME_HEADER},
    state::AppState,
};
use crate::{
    config::ReturnFormat,
    error::{BgRemovalError, Result},
    models::{ModelDescriptor, ModelVariant},
    services::{codec, DecodedImage},
    types::{ImageResult, RemovalOptions},
    worker::ModelStatus,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Body of `POST /remove-bg`
#[derive(Debug, Default, Deserialize)]
pub struct RemoveBackgroundRequest {
    /// Base64 string or data URL
    #[serde(rename = "imageData")]
    pub image_data: Option<String>,
    /// Absolute http(s) URL
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub alpha_matting: Option<bool>,
    pub return_format: Option<String>,
    pub alpha_matting_foreground_threshold: Option<u8>,
    pub alpha_matting_background_threshold: Option<u8>,
    pub alpha_matting_erode_size: Option<u32>,
}

/// Where the image of a request comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(String),
    Remote(String),
}

/// A validated removal request
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalJob {
    pub source: ImageSource,
    pub options: RemovalOptions,
    pub return_format: ReturnFormat,
}

impl RemoveBackgroundRequest {
    /// Validate the request
    ///
    /// # Errors
    /// - Both or neither image sources present
    /// - Unknown `return_format`
    /// - Inconsistent matting thresholds
    pub fn into_job(self) -> Result<RemovalJob> {
        let source = match (self.image_data, self.image_url) {
            (Some(data), None) => ImageSource::Inline(data),
            (None, Some(url)) => ImageSource::Remote(url),
            (Some(_), Some(_)) => {
                return Err(BgRemovalError::invalid_request(
                    "Provide either imageData or imageUrl, not both",
                ));
            },
            (None, None) => {
                return Err(BgRemovalError::invalid_request(
                    "No image provided. Use imageData or imageUrl",
                ));
            },
        };

        let return_format = self
            .return_format
            .as_deref()
            .map_or(Ok(ReturnFormat::default()), str::parse)?;

        let defaults = RemovalOptions::default();
        let options = RemovalOptions {
            alpha_matting: self.alpha_matting.unwrap_or(defaults.alpha_matting),
            foreground_threshold: self
                .alpha_matting_foreground_threshold
                .unwrap_or(defaults.foreground_threshold),
            background_threshold: self
                .alpha_matting_background_threshold
                .unwrap_or(defaults.background_threshold),
            erode_size: self
                .alpha_matting_erode_size
                .unwrap_or(defaults.erode_size),
        };
        options.validate()?;

        Ok(RemovalJob {
            source,
            options,
            return_format,
        })
    }
}

/// JSON body of a successful `base64` response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBackgroundResponse {
    pub success: bool,
    pub data_url: String,
    pub original_size: [u32; 2],
    pub processed_size: [u32; 2],
    /// Seconds, unrounded
    pub processing_time: f64,
    pub model: String,
}

/// `POST /remove-bg`
pub async fn remove_bg(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RemoveBackgroundRequest>, JsonRejection>,
) -> Result<Response> {
    let started = Instant::now();
    let Json(request) = payload.map_err(|rejection| json_rejection_error(&rejection))?;
    let job = request.into_job()?;

    let image_codec = state.codec;
    let decoded: DecodedImage = match job.source {
        ImageSource::Inline(data) => {
            run_blocking(move || image_codec.decode_inline(&data)).await?
        },
        ImageSource::Remote(url) => {
            let bytes = state.fetcher.fetch(&url).await?;
            run_blocking(move || image_codec.decode_bytes(&bytes)).await?
        },
    };
    debug!(
        format = ?decoded.format,
        width = decoded.processed_dimensions.0,
        height = decoded.processed_dimensions.1,
        "Decoded input image"
    );

    let DecodedImage {
        image,
        original_dimensions,
        processed_dimensions,
        ..
    } = decoded;
    let output = state.worker.remove(image, job.options).await?;

    let (output, png) =
        run_blocking(move || codec::encode_png(&output).map(|png| (output, png))).await?;
    let result = ImageResult {
        image: output,
        original_dimensions,
        processed_dimensions,
        elapsed: started.elapsed(),
    };

    info!(
        original = %format_size(result.original_dimensions),
        processed = %format_size(result.processed_dimensions),
        seconds = result.elapsed.as_secs_f64(),
        format = ?job.return_format,
        "Background removed"
    );

    Ok(match job.return_format {
        ReturnFormat::Base64 => Json(RemoveBackgroundResponse {
            success: true,
            data_url: codec::to_data_url(&png),
            original_size: [result.original_dimensions.0, result.original_dimensions.1],
            processed_size: [result.processed_dimensions.0, result.processed_dimensions.1],
            processing_time: result.elapsed.as_secs_f64(),
            model: state.config.model.name().to_string(),
        })
        .into_response(),
        ReturnFormat::Binary => (
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (ORIGINAL_SIZE_HEADER, format_size(result.original_dimensions)),
                (PROCESSED_SIZE_HEADER, format_size(result.processed_dimensions)),
                (
                    PROCESSING_TIME_HEADER,
                    result.elapsed.as_secs_f64().to_string(),
                ),
            ],
            png,
        )
            .into_response(),
    })
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub model_loaded: bool,
    pub max_image_size: u32,
    pub version: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_load_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status, load_time, error) = match state.worker.status() {
        ModelStatus::Ready { load_time } => (StatusCode::OK, "healthy", Some(load_time), None),
        ModelStatus::Loading => (StatusCode::SERVICE_UNAVAILABLE, "loading", None, None),
        ModelStatus::Failed(reason) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", None, Some(reason))
        },
    };

    let body = HealthResponse {
        status: status.to_string(),
        model: state.config.model.name().to_string(),
        model_loaded: load_time.is_some(),
        max_image_size: state.config.max_image_size,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model_load_seconds: load_time.map(|d| d.as_secs_f64()),
        error,
    };
    (status_code, Json(body))
}

/// Body of `GET /models`
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub current: String,
    pub available: Vec<ModelDescriptor>,
}

/// `GET /models`
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        current: state.config.model.name().to_string(),
        available: ModelVariant::catalog(),
    })
}

fn format_size((width, height): (u32, u32)) -> String {
    format!("{width}x{height}")
}

fn json_rejection_error(rejection: &JsonRejection) -> BgRemovalError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => BgRemovalError::invalid_request(
            "No JSON data provided (expected Content-Type: application/json)",
        ),
        JsonRejection::BytesRejection(_) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            BgRemovalError::PayloadTooLarge(rejection.body_text())
        },
        other => BgRemovalError::invalid_request(other.body_text()),
    }
}

/// Run CPU-bound image work on the blocking pool
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BgRemovalError::internal(format!("Image task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(data: Option<&str>, url: Option<&str>) -> RemoveBackgroundRequest {
        RemoveBackgroundRequest {
            image_data: data.map(str::to_string),
            image_url: url.map(str::to_string),
            ..RemoveBackgroundRequest::default()
        }
    }

    #[test]
    fn test_exactly_one_source() {
        assert_eq!(
            request(Some("abc"), None).into_job().unwrap().source,
            ImageSource::Inline("abc".to_string())
        );
        assert_eq!(
            request(None, Some("http://x/y.png")).into_job().unwrap().source,
            ImageSource::Remote("http://x/y.png".to_string())
        );
        assert_eq!(
            request(Some("abc"), Some("http://x")).into_job().unwrap_err().code(),
            "invalid_request"
        );
        assert_eq!(
            request(None, None).into_job().unwrap_err().code(),
            "invalid_request"
        );
    }

    #[test]
    fn test_defaults() {
        let job = request(Some("abc"), None).into_job().unwrap();
        assert_eq!(job.return_format, ReturnFormat::Base64);
        assert_eq!(job.options, RemovalOptions::default());
    }

    #[test]
    fn test_return_format_and_matting_overrides() {
        let job = RemoveBackgroundRequest {
            return_format: Some("binary".to_string()),
            alpha_matting: Some(false),
            alpha_matting_foreground_threshold: Some(200),
            alpha_matting_background_threshold: Some(20),
            alpha_matting_erode_size: Some(4),
            ..request(Some("abc"), None)
        }
        .into_job()
        .unwrap();

        assert_eq!(job.return_format, ReturnFormat::Binary);
        assert!(!job.options.alpha_matting);
        assert_eq!(job.options.foreground_threshold, 200);
        assert_eq!(job.options.background_threshold, 20);
        assert_eq!(job.options.erode_size, 4);
    }

    #[test]
    fn test_invalid_parameters() {
        let unknown_format = RemoveBackgroundRequest {
            return_format: Some("jpeg".to_string()),
            ..request(Some("abc"), None)
        };
        assert_eq!(unknown_format.into_job().unwrap_err().code(), "invalid_request");

        let inverted = RemoveBackgroundRequest {
            alpha_matting_foreground_threshold: Some(10),
            alpha_matting_background_threshold: Some(200),
            ..request(Some("abc"), None)
        };
        assert_eq!(inverted.into_job().unwrap_err().code(), "invalid_request");
    }

    #[test]
    fn test_request_field_names() {
        let parsed: RemoveBackgroundRequest = serde_json::from_str(
            r#"{"imageUrl": "https://example.com/a.png", "return_format": "binary", "alpha_matting": false}"#,
        )
        .unwrap();
        assert_eq!(parsed.image_url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(parsed.return_format.as_deref(), Some("binary"));
        assert_eq!(parsed.alpha_matting, Some(false));
    }
}
