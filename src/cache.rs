//! Model weight cache
//!
//! Model files are stored flat in a single directory, one ONNX file per
//! variant. The default location follows the platform cache directory:
//! - Linux: `~/.cache/imgly-bgremove/models/`
//! - macOS: `~/Library/Caches/imgly-bgremove/models/`
//! - Windows: `%LOCALAPPDATA%/imgly-bgremove/models/`

use crate::error::{BgRemovalError, Result};
use crate::models::ModelVariant;
use std::fs;
use std::path::{Path, PathBuf};

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache in the platform cache directory
    ///
    /// # Errors
    /// - Failed to determine the user cache directory
    /// - Failed to create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(
                    "Failed to determine cache directory. Set MODEL_DIR to choose one.",
                )
            })?
            .join("imgly-bgremove")
            .join("models");
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Create a cache rooted at `cache_dir`
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Create a cache from an optional directory override
    ///
    /// # Errors
    /// - See [`ModelCache::new`] and [`ModelCache::with_custom_cache_dir`]
    pub fn from_override(cache_dir: Option<&Path>) -> Result<Self> {
        match cache_dir {
            Some(dir) => Self::with_custom_cache_dir(dir),
            None => Self::new(),
        }
    }

    /// Path where the weights of `variant` live (may not exist)
    #[must_use]
    pub fn model_path(&self, variant: ModelVariant) -> PathBuf {
        self.cache_dir.join(variant.file_name())
    }

    /// Whether a non-empty weight file for `variant` is present
    #[must_use]
    pub fn is_model_cached(&self, variant: ModelVariant) -> bool {
        fs::metadata(self.model_path(variant))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Remove the cached weights of `variant`
    ///
    /// Returns whether a file was removed.
    ///
    /// # Errors
    /// - File system errors while removing the file
    pub fn clear_model(&self, variant: ModelVariant) -> Result<bool> {
        let path = self.model_path(variant);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| BgRemovalError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_cache_dir_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("models");
        let cache = ModelCache::with_custom_cache_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(cache.cache_dir(), dir.as_path());
    }

    #[test]
    fn test_model_path_uses_variant_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::from_override(Some(temp_dir.path())).unwrap();
        assert_eq!(
            cache.model_path(ModelVariant::U2net),
            temp_dir.path().join("u2net.onnx")
        );
    }

    #[test]
    fn test_is_model_cached_requires_non_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let path = cache.model_path(ModelVariant::U2netp);

        assert!(!cache.is_model_cached(ModelVariant::U2netp));
        fs::write(&path, b"").unwrap();
        assert!(!cache.is_model_cached(ModelVariant::U2netp));
        fs::write(&path, b"onnx").unwrap();
        assert!(cache.is_model_cached(ModelVariant::U2netp));
    }

    #[test]
    fn test_clear_model() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        assert!(!cache.clear_model(ModelVariant::U2net).unwrap());

        fs::write(cache.model_path(ModelVariant::U2net), b"weights").unwrap();
        assert!(cache.clear_model(ModelVariant::U2net).unwrap());
        assert!(!cache.is_model_cached(ModelVariant::U2net));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(176 * 1024 * 1024), "176.0 MB");
    }
}
