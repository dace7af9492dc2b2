//! PCA reduction transform
//!
//! Exported from the fitted scikit-learn `PCA` as JSON:
//!
//! ```json
//! {
//!   "mean": [..18432 floats..],
//!   "components": [[..18432 floats..], ...],
//!   "explained_variance": [..],
//!   "whiten": false
//! }
//! ```
//!
//! `transform(x) = (x - mean) . components^T`, scaled by
//! `1 / sqrt(explained_variance)` when `whiten` is set.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{FatigueError, Result};

/// A fitted linear reduction from the embedding to the classifier's input
pub trait ReductionTransform {
    fn transform(&self, features: &[f32]) -> Result<Vec<f32>>;
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
}

#[derive(Debug, Serialize, Deserialize)]
struct PcaFile {
    mean: Vec<f32>,
    components: Vec<Vec<f32>>,
    #[serde(default)]
    explained_variance: Option<Vec<f32>>,
    #[serde(default)]
    whiten: bool,
}

#[derive(Debug, Clone)]
pub struct PcaTransform {
    mean: Array1<f32>,
    /// (n_components, n_features)
    components: Array2<f32>,
    /// Per-component divisor when whitening
    scale: Option<Array1<f32>>,
}

impl PcaTransform {
    pub fn new(
        mean: Array1<f32>,
        components: Array2<f32>,
        explained_variance: Option<Array1<f32>>,
        whiten: bool,
    ) -> Result<Self> {
        let (n_components, n_features) = components.dim();
        if n_components == 0 || n_features == 0 {
            return Err(FatigueError::Prediction("PCA has no components".to_string()));
        }
        if mean.len() != n_features {
            return Err(FatigueError::Prediction(format!(
                "PCA mean has {} values, components have {} features",
                mean.len(),
                n_features
            )));
        }

        let scale = if whiten {
            let variance = explained_variance.ok_or_else(|| {
                FatigueError::Prediction("Whitened PCA is missing explained_variance".to_string())
            })?;
            if variance.len() != n_components {
                return Err(FatigueError::Prediction(format!(
                    "PCA explained_variance has {} values, expected {}",
                    variance.len(),
                    n_components
                )));
            }
            Some(variance.mapv(|v| v.max(f32::EPSILON).sqrt()))
        } else {
            None
        };

        Ok(Self {
            mean,
            components,
            scale,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
            .map_err(|e| {
                FatigueError::Prediction(format!("Invalid PCA artifact {:?}: {}", path, e))
            })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: PcaFile = serde_json::from_str(json)
            .map_err(|e| FatigueError::Prediction(format!("PCA JSON: {}", e)))?;

        let n_components = file.components.len();
        let n_features = file.components.first().map_or(0, Vec::len);
        if file.components.iter().any(|row| row.len() != n_features) {
            return Err(FatigueError::Prediction("PCA components are not rectangular".to_string()));
        }

        let flat: Vec<f32> = file.components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((n_components, n_features), flat)
            .map_err(|e| FatigueError::Prediction(format!("PCA components: {}", e)))?;

        Self::new(
            Array1::from(file.mean),
            components,
            file.explained_variance.map(Array1::from),
            file.whiten,
        )
    }
}

impl ReductionTransform for PcaTransform {
    fn transform(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.input_dim() {
            return Err(FatigueError::Prediction(format!(
                "Embedding has {} values, reduction transform expects {}",
                features.len(),
                self.input_dim()
            )));
        }

        let centered = &ArrayView1::from(features) - &self.mean;
        let mut projected = self.components.dot(&centered);
        if let Some(scale) = &self.scale {
            projected /= scale;
        }
        Ok(projected.to_vec())
    }

    fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    fn output_dim(&self) -> usize {
        self.components.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_projection_subtracts_mean() {
        let pca = PcaTransform::new(
            array![1.0, 1.0, 1.0],
            array![[1.0, 0.0, 0.0], [0.0, 1.0, 1.0]],
            None,
            false,
        )
        .unwrap();

        let out = pca.transform(&[3.0, 2.0, 4.0]).unwrap();
        assert_eq!(out, vec![2.0, 4.0]);
        assert_eq!(pca.input_dim(), 3);
        assert_eq!(pca.output_dim(), 2);
    }

    #[test]
    fn test_whitening_divides_by_std() {
        let json = r#"{
            "mean": [0.0, 0.0],
            "components": [[1.0, 0.0], [0.0, 1.0]],
            "explained_variance": [4.0, 16.0],
            "whiten": true
        }"#;
        let pca = PcaTransform::from_json(json).unwrap();
        let out = pca.transform(&[2.0, 8.0]).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_prediction_error() {
        let pca = PcaTransform::new(array![0.0, 0.0], array![[1.0, 0.0]], None, false).unwrap();
        let err = pca.transform(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, FatigueError::Prediction(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_ragged_components_rejected() {
        let json = r#"{"mean": [0.0, 0.0], "components": [[1.0, 0.0], [1.0]]}"#;
        assert!(PcaTransform::from_json(json).is_err());
    }

    #[test]
    fn test_mean_length_must_match() {
        let json = r#"{"mean": [0.0], "components": [[1.0, 0.0]]}"#;
        assert!(PcaTransform::from_json(json).is_err());
    }

    #[test]
    fn test_whiten_requires_variance() {
        let json = r#"{"mean": [0.0], "components": [[1.0]], "whiten": true}"#;
        assert!(PcaTransform::from_json(json).is_err());
    }
}
