//! Fatigue pipeline error types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while producing a fatigue prediction
///
/// Every variant aborts the whole pipeline; there are no partial results.
#[derive(Error, Debug)]
pub enum FatigueError {
    #[error("Failed to decode audio {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Artifacts not found: {0}")]
    ArtifactNotFound(String),

    #[error("Spectrogram computation failed: {0}")]
    Spectrogram(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Feature network error: {0}")]
    FeatureNetwork(String),

    #[error("Model download failed: {0}")]
    ModelDownload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FatigueError>;

/// Coarse error category surfaced to callers (CLI exit codes, JSON responses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    ArtifactNotFound,
    Prediction,
    Internal,
}

impl ErrorKind {
    /// Process exit code used by the `predict` binary
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Decode => 1,
            ErrorKind::ArtifactNotFound => 2,
            ErrorKind::Prediction => 3,
            ErrorKind::Internal => 4,
        }
    }

    /// Inverse of `exit_code` for callers that only see the process status
    ///
    /// Any other non-zero status (usage errors, crashes) is `Internal`.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(ErrorKind::Decode),
            2 => Some(ErrorKind::ArtifactNotFound),
            3 => Some(ErrorKind::Prediction),
            _ => Some(ErrorKind::Internal),
        }
    }
}

/// Exit status for command-line usage errors (BSD `EX_USAGE`)
///
/// Kept apart from the pipeline codes so a bad invocation is never mistaken
/// for a missing artifact.
pub const USAGE_EXIT_CODE: i32 = 64;

impl FatigueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FatigueError::Decode { .. } => ErrorKind::Decode,
            FatigueError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            FatigueError::Prediction(_) => ErrorKind::Prediction,
            FatigueError::Spectrogram(_)
            | FatigueError::FeatureNetwork(_)
            | FatigueError::ModelDownload(_)
            | FatigueError::InvalidConfig(_)
            | FatigueError::Transcode(_)
            | FatigueError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub(crate) fn decode(path: &std::path::Path, reason: impl ToString) -> Self {
        FatigueError::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(FatigueError::decode(std::path::Path::new("a.wav"), "bad").exit_code(), 1);
        assert_eq!(FatigueError::ArtifactNotFound("x".into()).exit_code(), 2);
        assert_eq!(FatigueError::Prediction("x".into()).exit_code(), 3);
        assert_eq!(FatigueError::FeatureNetwork("x".into()).exit_code(), 4);
    }

    #[test]
    fn test_exit_code_inverse() {
        assert_eq!(ErrorKind::from_exit_code(0), None);
        assert_eq!(ErrorKind::from_exit_code(1), Some(ErrorKind::Decode));
        assert_eq!(ErrorKind::from_exit_code(2), Some(ErrorKind::ArtifactNotFound));
        assert_eq!(ErrorKind::from_exit_code(3), Some(ErrorKind::Prediction));
        assert_eq!(ErrorKind::from_exit_code(4), Some(ErrorKind::Internal));
        assert_eq!(ErrorKind::from_exit_code(101), Some(ErrorKind::Internal));
        for kind in [
            ErrorKind::Decode,
            ErrorKind::ArtifactNotFound,
            ErrorKind::Prediction,
            ErrorKind::Internal,
        ] {
            assert_eq!(ErrorKind::from_exit_code(kind.exit_code()), Some(kind));
        }
    }

    #[test]
    fn test_usage_exit_code_is_not_a_pipeline_kind() {
        assert_eq!(
            ErrorKind::from_exit_code(USAGE_EXIT_CODE),
            Some(ErrorKind::Internal)
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ArtifactNotFound).unwrap();
        assert_eq!(json, "\"artifact_not_found\"");
    }
}
