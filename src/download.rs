//! Model downloading
//!
//! Weights are streamed into a `.part` file next to their final location,
//! optionally verified against a pinned SHA-256, then atomically renamed into
//! place. A half-finished download therefore never looks like a cached model.

use crate::cache::{format_size, ModelCache};
use crate::error::{BgRemovalError, Result};
use crate::models::ModelVariant;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::Instrument;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Model downloader
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure the weights of `variant` are on disk and return their path
    ///
    /// Downloads the model when it is missing. When `expected_sha256` is set
    /// the file is verified, both for fresh downloads and cached copies.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors during caching
    /// - Checksum mismatch
    pub async fn ensure_model(
        &self,
        variant: ModelVariant,
        expected_sha256: Option<&str>,
    ) -> Result<PathBuf> {
        let model_path = self.cache.model_path(variant);

        if self.cache.is_model_cached(variant) {
            log::debug!("Using cached model at {}", model_path.display());
            if !self.verify_file_integrity(&model_path, expected_sha256)? {
                return Err(BgRemovalError::model(format!(
                    "Cached model '{}' does not match the pinned SHA-256; remove it to download again",
                    model_path.display()
                )));
            }
            return Ok(model_path);
        }

        let url = variant.download_url();
        log::info!("Downloading model {variant} from {url}");

        let partial_path = partial_path_for(&model_path);
        let span = crate::tracing_config::spans::download(&url, &model_path);
        let downloaded = self
            .download_file(&url, &partial_path)
            .instrument(span)
            .await;
        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial_path);
                return Err(e);
            },
        };

        if !self.verify_file_integrity(&partial_path, expected_sha256)? {
            let _ = fs::remove_file(&partial_path);
            return Err(BgRemovalError::Download(format!(
                "Downloaded model from {url} does not match the pinned SHA-256"
            )));
        }

        fs::rename(&partial_path, &model_path)
            .map_err(|e| BgRemovalError::file_io_error("move downloaded model", &model_path, &e))?;

        log::info!(
            "Model {variant} ready at {} ({})",
            model_path.display(),
            format_size(bytes)
        );
        Ok(model_path)
    }

    /// Download a single file, returning the number of bytes written
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing
    pub async fn download_file(&self, url: &str, local_path: &Path) -> Result<u64> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::Download(format!(
                "HTTP error {} for {url}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let downloaded = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", local_path, &e))?;

        log::debug!(
            "Downloaded {} bytes to {}",
            downloaded,
            local_path.display()
        );
        Ok(downloaded)
    }

    /// Verify a file against an expected SHA-256
    ///
    /// Returns `true` when no hash is expected.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(
        &self,
        file_path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            BgRemovalError::file_io_error("read file for verification", file_path, &e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let actual_hash = format!("{:x}", hasher.finalize());

        if actual_hash.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

fn partial_path_for(model_path: &Path) -> PathBuf {
    let mut name = model_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    model_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn downloader(dir: &Path) -> ModelDownloader {
        ModelDownloader::new(ModelCache::with_custom_cache_dir(dir).unwrap()).unwrap()
    }

    fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    #[test]
    fn test_verify_file_integrity_no_hash() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.txt");
        fs::write(&test_file, "test content").unwrap();

        assert!(downloader(temp_dir.path())
            .verify_file_integrity(&test_file, None)
            .unwrap());
    }

    #[test]
    fn test_verify_file_integrity_with_hashes() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.txt");
        fs::write(&test_file, "test content").unwrap();
        let downloader = downloader(temp_dir.path());

        let good = sha256_hex(b"test content");
        assert!(downloader
            .verify_file_integrity(&test_file, Some(&good))
            .unwrap());
        assert!(downloader
            .verify_file_integrity(&test_file, Some(&good.to_ascii_uppercase()))
            .unwrap());
        assert!(!downloader
            .verify_file_integrity(&test_file, Some(&"0".repeat(64)))
            .unwrap());
    }

    #[test]
    fn test_verify_file_integrity_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nonexistent.txt");

        let err = downloader(temp_dir.path())
            .verify_file_integrity(&missing, Some("hash"))
            .unwrap_err();
        assert!(err.to_string().contains("read file for verification"));
    }

    #[tokio::test]
    async fn test_ensure_model_uses_cached_file() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(temp_dir.path());
        let path = downloader.cache().model_path(ModelVariant::U2net);
        fs::write(&path, b"cached weights").unwrap();

        let resolved = downloader
            .ensure_model(ModelVariant::U2net, Some(&sha256_hex(b"cached weights")))
            .await
            .unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn test_ensure_model_rejects_tampered_cache() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = downloader(temp_dir.path());
        fs::write(
            downloader.cache().model_path(ModelVariant::U2net),
            b"tampered",
        )
        .unwrap();

        let err = downloader
            .ensure_model(ModelVariant::U2net, Some(&"0".repeat(64)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "model_error");
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path_for(Path::new("/models/u2net.onnx")),
            PathBuf::from("/models/u2net.onnx.part")
        );
    }
}
