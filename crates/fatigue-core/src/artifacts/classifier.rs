//! Ensemble classifier exported to ONNX
//!
//! skl2onnx with `zipmap=False` produces two outputs:
//! - `output_label`: int64 `[1]`
//! - `output_probability`: float `[1, n_classes]`

use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{FatigueError, Result};

/// Label plus per-class probabilities for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    pub label: i64,
    pub probabilities: Vec<f32>,
}

pub trait Classifier {
    fn classify(&mut self, features: &[f32]) -> Result<ClassifierOutput>;
}

pub struct OnnxClassifier {
    session: Session,
    input_name: String,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, input_name: &str) -> Result<Self> {
        log::info!("Loading classifier from {:?}", model_path);

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                FatigueError::Prediction(format!(
                    "Failed to load classifier {:?}: {}",
                    model_path, e
                ))
            })?;

        Ok(Self {
            session,
            input_name: input_name.to_string(),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&mut self, features: &[f32]) -> Result<ClassifierOutput> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| FatigueError::Prediction(format!("Classifier input shape: {}", e)))?;
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| FatigueError::Prediction(format!("Tensor creation error: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| FatigueError::Prediction(format!("Classifier inference error: {}", e)))?;

        let mut values = outputs.iter().map(|(_, value)| value);
        let (label_value, proba_value) = match (values.next(), values.next()) {
            (Some(label), Some(proba)) => (label, proba),
            _ => {
                return Err(FatigueError::Prediction(
                    "Classifier must expose label and probability outputs".to_string(),
                ))
            }
        };

        let (_, labels) = label_value
            .try_extract_tensor::<i64>()
            .map_err(|e| FatigueError::Prediction(format!("Label extraction error: {}", e)))?;
        let label = labels
            .first()
            .copied()
            .ok_or_else(|| FatigueError::Prediction("Classifier returned no label".to_string()))?;

        // A ZipMap output (sequence of maps) fails here
        let (_, probabilities) = proba_value.try_extract_tensor::<f32>().map_err(|e| {
            FatigueError::Prediction(format!(
                "Probability extraction error (export with zipmap=False): {}",
                e
            ))
        })?;

        Ok(ClassifierOutput {
            label,
            probabilities: probabilities.to_vec(),
        })
    }
}
