//! Feature network model management
//!
//! Locates the exported VGG19 ONNX file. An explicitly configured path wins;
//! otherwise the file is looked up in `~/.cache/fatigue-coach/models/` and
//! downloaded there on first use when a download URL is configured.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::NetworkConfig;
use crate::error::{FatigueError, Result};

/// Manages the feature network download and cache
pub struct NetworkModelManager {
    explicit_path: Option<PathBuf>,
    cache_dir: PathBuf,
    filename: String,
    download_url: Option<String>,
}

impl NetworkModelManager {
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_cache_dir()?,
        };
        Ok(Self {
            explicit_path: config.model_path.clone(),
            cache_dir,
            filename: config.filename.clone(),
            download_url: config.download_url.clone(),
        })
    }

    #[cfg(test)]
    fn with_cache_dir(cache_dir: PathBuf, filename: &str) -> Self {
        Self {
            explicit_path: None,
            cache_dir,
            filename: filename.to_string(),
            download_url: None,
        }
    }

    /// Default location: `~/.cache/fatigue-coach/models/`
    fn default_cache_dir() -> Result<PathBuf> {
        let base = dirs::cache_dir().ok_or_else(|| {
            FatigueError::InvalidConfig("Could not determine cache directory".to_string())
        })?;
        Ok(base.join("fatigue-coach").join("models"))
    }

    /// Local path of the cached model
    pub fn cached_path(&self) -> PathBuf {
        self.cache_dir.join(&self.filename)
    }

    /// Get the model path, downloading into the cache if necessary
    pub fn ensure_model(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit_path {
            if !path.exists() {
                return Err(FatigueError::FeatureNetwork(format!(
                    "Feature network not found at {}",
                    path.display()
                )));
            }
            log::info!("Feature network found at {:?}", path);
            return Ok(path.clone());
        }

        let model_path = self.cached_path();
        if model_path.exists() {
            log::info!("Feature network found in cache at {:?}", model_path);
            return Ok(model_path);
        }

        let url = self.download_url.as_deref().ok_or_else(|| {
            FatigueError::FeatureNetwork(format!(
                "Feature network not found at {} and no download URL configured",
                model_path.display()
            ))
        })?;

        log::info!("Downloading feature network from {}", url);
        self.download_file(url, &model_path)?;
        Ok(model_path)
    }

    /// Download a file from URL to target path with atomic rename
    fn download_file(&self, url: &str, target_path: &Path) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let temp_path = target_path.with_extension("tmp");

        let response = ureq::get(url)
            .call()
            .map_err(|e| FatigueError::ModelDownload(format!("{}: {}", url, e)))?;

        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut file = fs::File::create(&temp_path)?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded: u64 = 0;

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
        }

        file.flush()?;
        drop(file);

        if let Some(expected) = content_length {
            if downloaded != expected {
                fs::remove_file(&temp_path).ok();
                return Err(FatigueError::ModelDownload(format!(
                    "Download incomplete: expected {} bytes, got {}",
                    expected, downloaded
                )));
            }
        }

        fs::rename(&temp_path, target_path)?;

        log::info!("Downloaded feature network to {:?} ({} bytes)", target_path, downloaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_path_uses_filename() {
        let mgr = NetworkModelManager::with_cache_dir("/tmp/fatigue-test".into(), "vgg.onnx");
        assert_eq!(mgr.cached_path(), PathBuf::from("/tmp/fatigue-test/vgg.onnx"));
    }

    #[test]
    fn test_missing_model_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = NetworkModelManager::with_cache_dir(dir.path().to_path_buf(), "vgg.onnx");
        assert!(matches!(mgr.ensure_model(), Err(FatigueError::FeatureNetwork(_))));
    }

    #[test]
    fn test_cached_model_is_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vgg.onnx"), b"onnx").unwrap();
        let mgr = NetworkModelManager::with_cache_dir(dir.path().to_path_buf(), "vgg.onnx");
        assert_eq!(mgr.ensure_model().unwrap(), dir.path().join("vgg.onnx"));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let config = NetworkConfig {
            model_path: Some(PathBuf::from("/nonexistent/vgg.onnx")),
            cache_dir: Some(PathBuf::from("/tmp/fatigue-test")),
            ..NetworkConfig::default()
        };
        let mgr = NetworkModelManager::from_config(&config).unwrap();
        assert!(mgr.ensure_model().is_err());
    }
}
