//! Configuration for the fatigue pipeline
//!
//! Configuration is stored as YAML. Default location:
//! `~/.config/fatigue-coach/config.yaml` (override with `--config` or
//! `$FATIGUE_CONFIG`).
//!
//! Only file locations and runtime knobs live here. The signal-processing
//! parameters are fixed in `constants` because the fitted artifacts depend on them.
//!
//! # Usage
//!
//! ```ignore
//! use fatigue_core::config::{load_config, resolve_config_path, FatigueConfig};
//!
//! let config: FatigueConfig = load_config(&resolve_config_path(None));
//! ```

mod io;
mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CLASSIFIER_FILENAME, DEFAULT_NETWORK_FILENAME, DEFAULT_PCA_FILENAME};
use crate::features::TensorLayout;

pub use io::load_config;
pub use paths::{
    default_artifact_dir, default_config_path, resolve_config_path, ARTIFACT_DIR_ENV, CONFIG_ENV,
};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Pretrained feature network (VGG19 exported to ONNX)
    pub network: NetworkConfig,
    /// Fitted PCA + ensemble classifier
    pub artifacts: ArtifactConfig,
    /// External transcoder used for uploads symphonia cannot read (e.g. WebM/Opus)
    pub transcode: TranscodeConfig,
}

impl FatigueConfig {
    /// Validate and repair values that would make the pipeline unusable
    pub fn validate(&mut self) {
        self.network.validate();
        self.artifacts.validate();
    }
}

/// Feature network configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Explicit model file; bypasses the cache when set
    pub model_path: Option<PathBuf>,
    /// Cache directory (default `~/.cache/fatigue-coach/models/`)
    pub cache_dir: Option<PathBuf>,
    /// Model file name inside the cache directory
    pub filename: String,
    /// Where to fetch the model on first use if it is not cached
    pub download_url: Option<String>,
    /// Name of the image input in the ONNX graph
    pub input_name: String,
    pub layout: TensorLayout,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            cache_dir: None,
            filename: DEFAULT_NETWORK_FILENAME.to_string(),
            download_url: None,
            input_name: String::from("input_1"),
            layout: TensorLayout::Nhwc,
            intra_threads: 1,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&mut self) {
        self.intra_threads = self.intra_threads.clamp(1, 64);
        if self.filename.trim().is_empty() {
            self.filename = DEFAULT_NETWORK_FILENAME.to_string();
        }
    }
}

/// Artifact location configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory holding both artifacts
    pub dir: Option<PathBuf>,
    /// Extra directories searched after `dir` and `$FATIGUE_ARTIFACT_DIR`
    pub fallback_dirs: Vec<PathBuf>,
    pub pca_filename: String,
    pub classifier_filename: String,
    /// Name of the feature input in the classifier ONNX graph
    pub classifier_input_name: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: None,
            fallback_dirs: Vec::new(),
            pca_filename: DEFAULT_PCA_FILENAME.to_string(),
            classifier_filename: DEFAULT_CLASSIFIER_FILENAME.to_string(),
            classifier_input_name: String::from("float_input"),
        }
    }
}

impl ArtifactConfig {
    pub fn validate(&mut self) {
        if self.pca_filename.trim().is_empty() {
            self.pca_filename = DEFAULT_PCA_FILENAME.to_string();
        }
        if self.classifier_filename.trim().is_empty() {
            self.classifier_filename = DEFAULT_CLASSIFIER_FILENAME.to_string();
        }
    }
}

/// Transcoder configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub enabled: bool,
    /// ffmpeg executable
    pub program: PathBuf,
    /// Extra arguments placed before `-i <input>`
    pub args: Vec<String>,
    /// Where uploads and transcoded audio are staged (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: PathBuf::from("ffmpeg"),
            args: vec![
                String::from("-hide_banner"),
                String::from("-loglevel"),
                String::from("error"),
            ],
            scratch_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FatigueConfig::default();
        assert_eq!(config.artifacts.pca_filename, "pca_women.json");
        assert_eq!(config.artifacts.classifier_filename, "ensemble_women.onnx");
        assert_eq!(config.network.layout, TensorLayout::Nhwc);
        assert_eq!(config.network.intra_threads, 1);
        assert!(config.transcode.enabled);
        assert!(config.transcode.scratch_dir.is_none());
    }

    #[test]
    fn test_validation_repairs_values() {
        let mut config = FatigueConfig::default();
        config.network.intra_threads = 0;
        config.artifacts.pca_filename = String::from("  ");
        config.validate();
        assert_eq!(config.network.intra_threads, 1);
        assert_eq!(config.artifacts.pca_filename, "pca_women.json");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "artifacts:\n  dir: /srv/models\nnetwork:\n  layout: nchw\n";
        let config: FatigueConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.artifacts.dir, Some(PathBuf::from("/srv/models")));
        assert_eq!(config.artifacts.classifier_filename, "ensemble_women.onnx");
        assert_eq!(config.network.layout, TensorLayout::Nchw);
        assert_eq!(config.network.input_name, "input_1");
    }
}
