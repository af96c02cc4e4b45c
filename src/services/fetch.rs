//! Remote image retrieval
//!
//! Only absolute `http`/`https` URLs are fetched. The whole exchange is bound
//! by the configured timeout and the body by the configured byte limit, which
//! is checked against `Content-Length` up front and again while streaming.

use crate::{
    config::ServiceConfig,
    error::{BgRemovalError, FetchFailure, Result},
    tracing_config::spans,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::Instrument;
use url::Url;

/// Source of remote image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the bytes behind `url`
    ///
    /// # Errors
    /// - [`BgRemovalError::Fetch`] with the matching [`FetchFailure`]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`ImageFetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("imgly-bgremove-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BgRemovalError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, max_bytes })
    }

    /// # Errors
    /// - Failed to create HTTP client
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::new(config.fetch_timeout, config.max_fetch_bytes)
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::fetch(
                FetchFailure::Status(status.as_u16()),
                format!("{url} answered with HTTP {status}"),
            ));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large(length));
            }
        }

        let capacity = response
            .content_length()
            .map_or(0, |len| len as usize)
            .min(self.max_bytes);
        let mut body = Vec::with_capacity(capacity);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_request_error(&e))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(bytes = body.len(), "Fetched remote image");
        Ok(body)
    }

    fn too_large(&self, length: u64) -> BgRemovalError {
        BgRemovalError::fetch(
            FetchFailure::TooLarge,
            format!(
                "remote image has at least {length} bytes, the limit is {}",
                self.max_bytes
            ),
        )
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = validate_url(url)?;
        let span = spans::fetch(url.as_str());
        self.download(url).instrument(span).await
    }
}

/// Parse `raw` as an absolute http(s) URL
///
/// # Errors
/// - [`FetchFailure::InvalidUrl`] for malformed URLs or other schemes
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        BgRemovalError::fetch(FetchFailure::InvalidUrl, format!("invalid URL '{raw}': {e}"))
    })?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(BgRemovalError::fetch(
            FetchFailure::InvalidUrl,
            format!("URL '{raw}' has no host"),
        )),
        scheme => Err(BgRemovalError::fetch(
            FetchFailure::InvalidUrl,
            format!("unsupported URL scheme '{scheme}', expected http or https"),
        )),
    }
}

fn classify_request_error(error: &reqwest::Error) -> BgRemovalError {
    if error.is_timeout() {
        BgRemovalError::fetch(FetchFailure::Timeout, "remote host did not answer in time")
    } else if error.is_builder() {
        BgRemovalError::fetch(FetchFailure::InvalidUrl, error.to_string())
    } else {
        BgRemovalError::fetch(FetchFailure::Network, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_accepts_http_and_https() {
        assert!(validate_url("http://example.com/cat.png").is_ok());
        assert!(validate_url("  https://example.com/a/b.jpg?x=1 ").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_other_inputs() {
        for raw in [
            "ftp://example.com/cat.png",
            "file:///etc/passwd",
            "example.com/cat.png",
            "",
            "http://",
        ] {
            let err = validate_url(raw).unwrap_err();
            assert_eq!(err.code(), "invalid_url", "input {raw:?}");
            assert!(err.is_client_error());
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_scheme_before_network() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(1), 1024).unwrap();
        let err = fetcher.fetch("ftp://localhost/image.png").await.unwrap_err();
        assert_eq!(err.code(), "invalid_url");
    }
}
