//! Embedding -> reduction transform -> classifier

use crate::artifacts::{Classifier, ReductionTransform};
use crate::error::{FatigueError, Result};
use crate::features::Embedding;

/// Final model decision for one recording
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class label; 1 means fatigued
    pub label: i64,
    /// Positive-class probability for binary models, the max otherwise
    pub probability: f32,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    pub fn is_fatigued(&self) -> bool {
        self.label == 1
    }
}

/// Index 1 for a binary model, else the maximum class probability
pub fn select_probability(probabilities: &[f32]) -> Option<f32> {
    match probabilities {
        [] => None,
        [_, positive] => Some(*positive),
        _ => probabilities.iter().copied().reduce(f32::max),
    }
}

pub fn predict(
    embedding: &Embedding,
    reducer: &dyn ReductionTransform,
    classifier: &mut dyn Classifier,
) -> Result<Prediction> {
    let reduced = reducer.transform(embedding.as_slice())?;
    log::debug!("Reduced embedding: {} -> {} dims", embedding.len(), reduced.len());

    let output = classifier.classify(&reduced)?;
    if output.probabilities.iter().any(|p| !p.is_finite()) {
        return Err(FatigueError::Prediction(
            "Classifier returned non-finite probabilities".to_string(),
        ));
    }
    let probability = select_probability(&output.probabilities).ok_or_else(|| {
        FatigueError::Prediction("Classifier returned no probabilities".to_string())
    })?;

    log::info!("Predicted label {} (p={:.4})", output.label, probability);

    Ok(Prediction {
        label: output.label,
        probability,
        probabilities: output.probabilities,
    })
}
