//! Error types for background removal operations
//!
//! Every failure in the crate is a [`BgRemovalError`]. Each variant carries a
//! stable machine-readable code and an [`ErrorCategory`], which the HTTP layer
//! uses to pick a status code and render a structured error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Why a remote image fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The reference is not an absolute http(s) URL
    InvalidUrl,
    /// The remote host did not answer within the configured timeout
    Timeout,
    /// The remote host answered with a non-success status
    Status(u16),
    /// The payload exceeds the configured maximum size
    TooLarge,
    /// Connection, DNS or transfer failure
    Network,
}

/// Coarse classification used for status mapping and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request itself is malformed or violates a limit
    BadInput,
    /// The image bytes could not be decoded
    Decode,
    /// A remote image could not be retrieved
    Fetch,
    /// The model is unavailable or inference failed
    Model,
    /// The result image could not be encoded
    Encode,
    /// Anything else on the server side
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadInput => "bad_input",
            Self::Decode => "decode",
            Self::Fetch => "fetch",
            Self::Model => "model",
            Self::Encode => "encode",
            Self::Internal => "internal",
        }
    }
}

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image library errors outside of request decoding
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Request shape or parameter errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed base64 payload or data URL
    #[error("Invalid image encoding: {0}")]
    InvalidEncoding(String),

    /// Zero-length image payload
    #[error("Image data is empty")]
    EmptyImage,

    /// Unrecognized or unsupported image format
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Recognized format but undecodable contents
    #[error("Corrupt image data: {0}")]
    CorruptImage(String),

    /// Request body exceeds the configured size limit
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// Image exceeds the dimension limit and the policy is to reject
    #[error("Image dimensions {width}x{height} exceed the maximum of {max} pixels per side")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    /// Remote image retrieval errors
    #[error("Failed to fetch image: {message}")]
    Fetch {
        failure: FetchFailure,
        message: String,
    },

    /// A removal was requested before the model finished loading
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Tensor and mask processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Result encoding errors
    #[error("Failed to encode result: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model download errors
    #[error("Download error: {0}")]
    Download(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new invalid encoding error
    pub fn invalid_encoding<S: Into<String>>(msg: S) -> Self {
        Self::InvalidEncoding(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new corrupt image error
    pub fn corrupt_image<S: Into<String>>(msg: S) -> Self {
        Self::CorruptImage(msg.into())
    }

    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(failure: FetchFailure, msg: S) -> Self {
        Self::Fetch {
            failure,
            message: msg.into(),
        }
    }

    /// Create a new model-not-loaded error
    pub fn model_not_loaded<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotLoaded(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create download error with network context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Download(format!("{}: {error}", context.into()))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Stable machine-readable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::Image(_) => "image_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidEncoding(_) => "invalid_encoding",
            Self::EmptyImage => "empty_image",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::CorruptImage(_) => "corrupt_image",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::ImageTooLarge { .. } => "image_too_large",
            Self::Fetch { failure, .. } => match failure {
                FetchFailure::InvalidUrl => "invalid_url",
                FetchFailure::Timeout => "fetch_timeout",
                FetchFailure::Status(_) => "fetch_status",
                FetchFailure::TooLarge => "fetch_too_large",
                FetchFailure::Network => "fetch_network",
            },
            Self::ModelNotLoaded(_) => "model_not_loaded",
            Self::Inference(_) => "inference_error",
            Self::Model(_) => "model_error",
            Self::Processing(_) => "processing_error",
            Self::Encode(_) => "encode_error",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Download(_) => "download_error",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidEncoding(_)
            | Self::PayloadTooLarge(_)
            | Self::ImageTooLarge { .. }
            | Self::Fetch {
                failure: FetchFailure::InvalidUrl,
                ..
            } => ErrorCategory::BadInput,
            Self::EmptyImage | Self::UnsupportedFormat(_) | Self::CorruptImage(_) => {
                ErrorCategory::Decode
            },
            Self::Fetch { .. } => ErrorCategory::Fetch,
            Self::ModelNotLoaded(_) | Self::Inference(_) | Self::Model(_) | Self::Processing(_) => {
                ErrorCategory::Model
            },
            Self::Encode(_) => ErrorCategory::Encode,
            Self::Io(_)
            | Self::Image(_)
            | Self::InvalidConfig(_)
            | Self::Download(_)
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidEncoding(_)
            | Self::EmptyImage
            | Self::UnsupportedFormat(_)
            | Self::CorruptImage(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) | Self::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Fetch { failure, .. } => match failure {
                FetchFailure::InvalidUrl => StatusCode::BAD_REQUEST,
                FetchFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FetchFailure::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                FetchFailure::Status(_) | FetchFailure::Network => StatusCode::BAD_GATEWAY,
            },
            Self::ModelNotLoaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Io(_)
            | Self::Image(_)
            | Self::Inference(_)
            | Self::Model(_)
            | Self::Processing(_)
            | Self::Encode(_)
            | Self::InvalidConfig(_)
            | Self::Download(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller is at fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub category: ErrorCategory,
    pub code: &'static str,
}

impl From<&BgRemovalError> for ErrorBody {
    fn from(err: &BgRemovalError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            category: err.category(),
            code: err.code(),
        }
    }
}

impl IntoResponse for BgRemovalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), category = self.category().as_str(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), category = self.category().as_str(), error = %self, "Request rejected");
        }

        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_input_maps_to_400() {
        let err = BgRemovalError::invalid_request("Provide exactly one of imageData or imageUrl");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.category(), ErrorCategory::BadInput);
        assert_eq!(err.code(), "invalid_request");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_decode_errors_are_distinct() {
        let codes = [
            BgRemovalError::EmptyImage.code(),
            BgRemovalError::unsupported_format("unknown").code(),
            BgRemovalError::corrupt_image("truncated").code(),
            BgRemovalError::invalid_encoding("bad base64").code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            BgRemovalError::EmptyImage.category(),
            ErrorCategory::Decode
        );
        assert_eq!(
            BgRemovalError::invalid_encoding("x").category(),
            ErrorCategory::BadInput
        );
    }

    #[test]
    fn test_fetch_failure_status_mapping() {
        let cases = [
            (FetchFailure::InvalidUrl, StatusCode::BAD_REQUEST),
            (FetchFailure::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (FetchFailure::Status(404), StatusCode::BAD_GATEWAY),
            (FetchFailure::TooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (FetchFailure::Network, StatusCode::BAD_GATEWAY),
        ];
        for (failure, expected) in cases {
            let err = BgRemovalError::fetch(failure, "boom");
            assert_eq!(err.status_code(), expected, "{failure:?}");
        }
        assert!(BgRemovalError::fetch(FetchFailure::Timeout, "slow")
            .to_string()
            .starts_with("Failed to fetch image"));
    }

    #[test]
    fn test_server_side_errors() {
        assert_eq!(
            BgRemovalError::model_not_loaded("loading").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            BgRemovalError::inference("ort failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BgRemovalError::encode("png").category(),
            ErrorCategory::Encode
        );
        assert!(!BgRemovalError::internal("x").is_client_error());

        let processing = BgRemovalError::processing("mask shape mismatch");
        assert_eq!(processing.code(), "processing_error");
        assert_eq!(processing.category(), ErrorCategory::Model);
        assert_eq!(processing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_config_value_error_message() {
        let err = BgRemovalError::config_value_error("max_image_size", 0, "32-16384", Some(2048));
        let msg = err.to_string();
        assert!(msg.contains("max_image_size"));
        assert!(msg.contains("32-16384"));
        assert!(msg.contains("Recommended: 2048"));
    }

    #[test]
    fn test_error_body_shape() {
        let err = BgRemovalError::ImageTooLarge {
            width: 5000,
            height: 100,
            max: 2048,
        };
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["category"], "bad_input");
        assert_eq!(body["code"], "image_too_large");
        assert!(body["error"].as_str().unwrap().contains("5000x100"));
    }
}
