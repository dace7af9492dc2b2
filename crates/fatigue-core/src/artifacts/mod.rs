//! Fitted model artifacts: dimensionality reduction + classifier
//!
//! ## Resolution order
//!
//! 1. Both explicit paths (`--pca` and `--model`): both must exist. No
//!    directory search happens when either is missing.
//! 2. Otherwise the first candidate directory holding both files wins:
//!    `--artifact-dir`, `artifacts.dir` from the config file,
//!    `$FATIGUE_ARTIFACT_DIR`, `artifacts.fallback_dirs`, then
//!    `<data_dir>/fatigue-coach/models`.
//!
//! ## Formats
//!
//! - Reduction transform: PCA exported as JSON (`pca.rs`)
//! - Classifier: the fitted ensemble exported to ONNX with skl2onnx,
//!   `zipmap=False` (`classifier.rs`)

mod classifier;
mod pca;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{default_artifact_dir, ArtifactConfig, ARTIFACT_DIR_ENV};
use crate::error::{FatigueError, Result};

pub use classifier::{Classifier, ClassifierOutput, OnnxClassifier};
pub use pca::{PcaTransform, ReductionTransform};

/// Caller-supplied artifact locations (all optional)
#[derive(Debug, Clone, Default)]
pub struct ArtifactRequest {
    /// Explicit reduction transform file
    pub pca: Option<PathBuf>,
    /// Explicit classifier file
    pub model: Option<PathBuf>,
    /// Directory searched before the configured candidates
    pub dir: Option<PathBuf>,
}

impl ArtifactRequest {
    pub fn explicit(pca: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            pca: Some(pca.into()),
            model: Some(model.into()),
            dir: None,
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }
}

/// Resolved artifact files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Directory reported as "Artifact dir"
    pub dir: PathBuf,
    pub pca: PathBuf,
    pub classifier: PathBuf,
}

/// Where a candidate directory came from (for diagnostics)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Request,
    Config,
    Environment,
    Fallback,
    Default,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateSource::Request => "--artifact-dir",
            CandidateSource::Config => "config",
            CandidateSource::Environment => ARTIFACT_DIR_ENV,
            CandidateSource::Fallback => "fallback",
            CandidateSource::Default => "default",
        };
        f.write_str(name)
    }
}

/// Resolves artifact paths from explicit paths or an ordered candidate list
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    candidates: Vec<(PathBuf, CandidateSource)>,
    pca_filename: String,
    classifier_filename: String,
}

impl ArtifactLocator {
    /// Build the candidate list from configuration and the environment
    pub fn from_config(config: &ArtifactConfig) -> Self {
        let mut candidates = Vec::new();
        if let Some(dir) = &config.dir {
            candidates.push((dir.clone(), CandidateSource::Config));
        }
        if let Some(dir) = std::env::var_os(ARTIFACT_DIR_ENV).filter(|d| !d.is_empty()) {
            candidates.push((PathBuf::from(dir), CandidateSource::Environment));
        }
        for dir in &config.fallback_dirs {
            candidates.push((dir.clone(), CandidateSource::Fallback));
        }
        if let Some(dir) = default_artifact_dir() {
            candidates.push((dir, CandidateSource::Default));
        }

        Self {
            candidates,
            pca_filename: config.pca_filename.clone(),
            classifier_filename: config.classifier_filename.clone(),
        }
    }

    /// Locator with an explicit candidate list
    pub fn new(candidates: Vec<PathBuf>, pca_filename: &str, classifier_filename: &str) -> Self {
        Self {
            candidates: candidates
                .into_iter()
                .map(|dir| (dir, CandidateSource::Fallback))
                .collect(),
            pca_filename: pca_filename.to_string(),
            classifier_filename: classifier_filename.to_string(),
        }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Path> {
        self.candidates.iter().map(|(dir, _)| dir.as_path())
    }

    pub fn resolve(&self, request: &ArtifactRequest) -> Result<ArtifactPaths> {
        match (&request.pca, &request.model) {
            (Some(pca), Some(model)) => return resolve_explicit(pca, model),
            (Some(path), None) | (None, Some(path)) => {
                log::warn!(
                    "Ignoring lone explicit artifact path {:?}; \
                     both --pca and --model are required",
                    path
                );
            }
            (None, None) => {}
        }

        let requested = request
            .dir
            .iter()
            .map(|dir| (dir.as_path(), CandidateSource::Request));
        let configured = self
            .candidates
            .iter()
            .map(|(dir, source)| (dir.as_path(), *source));

        let mut searched = Vec::new();
        for (dir, source) in requested.chain(configured) {
            let pca = dir.join(&self.pca_filename);
            let classifier = dir.join(&self.classifier_filename);
            if pca.is_file() && classifier.is_file() {
                log::info!("Using artifacts from {:?} ({})", dir, source);
                return Ok(ArtifactPaths {
                    dir: dir.to_path_buf(),
                    pca,
                    classifier,
                });
            }
            log::debug!("No artifacts in {:?} ({})", dir, source);
            searched.push(dir.display().to_string());
        }

        Err(FatigueError::ArtifactNotFound(format!(
            "none of [{}] contains both {} and {}",
            searched.join(", "),
            self.pca_filename,
            self.classifier_filename
        )))
    }
}

fn resolve_explicit(pca: &Path, model: &Path) -> Result<ArtifactPaths> {
    if !pca.is_file() || !model.is_file() {
        return Err(FatigueError::ArtifactNotFound(format!(
            "provided artifact paths not found: {}, {}",
            pca.display(),
            model.display()
        )));
    }

    let dir = pca
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(ArtifactPaths {
        dir,
        pca: pca.to_path_buf(),
        classifier: model.to_path_buf(),
    })
}

/// Deserialized artifacts, read-only for the duration of one prediction
pub struct LoadedArtifacts {
    pub reducer: Box<dyn ReductionTransform>,
    pub classifier: Box<dyn Classifier>,
}

/// Deserializes artifacts from resolved paths
pub trait ArtifactLoader {
    fn load(&self, paths: &ArtifactPaths) -> Result<LoadedArtifacts>;
}

/// Loads the PCA JSON and the ONNX classifier from disk
#[derive(Debug, Clone)]
pub struct FileArtifactLoader {
    classifier_input_name: String,
}

impl FileArtifactLoader {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            classifier_input_name: config.classifier_input_name.clone(),
        }
    }
}

impl ArtifactLoader for FileArtifactLoader {
    fn load(&self, paths: &ArtifactPaths) -> Result<LoadedArtifacts> {
        let reducer = PcaTransform::from_file(&paths.pca)?;
        log::info!(
            "Loaded reduction transform {:?}: {} -> {} dims",
            paths.pca,
            reducer.input_dim(),
            reducer.output_dim()
        );
        let classifier = OnnxClassifier::load(&paths.classifier, &self.classifier_input_name)?;
        Ok(LoadedArtifacts {
            reducer: Box::new(reducer),
            classifier: Box::new(classifier),
        })
    }
}
