//! ONNX Runtime feature network
//!
//! Runs VGG19 (ImageNet weights, no classification head, 196x196x3 input)
//! exported to ONNX. The session is created once and reused for every
//! prediction made through the same engine.

use std::path::Path;

use ndarray::{Array4, ArrayView4};
use ort::session::Session;
use ort::value::Tensor;

use super::{FeatureNetwork, TensorLayout};
use crate::config::NetworkConfig;
use crate::constants::FEATURE_MAP_CHANNELS;
use crate::error::{FatigueError, Result};

pub struct OnnxFeatureNetwork {
    session: Session,
    input_name: String,
    layout: TensorLayout,
}

impl OnnxFeatureNetwork {
    /// Load the network from an ONNX file.
    pub fn load(model_path: &Path, config: &NetworkConfig) -> Result<Self> {
        log::info!("Loading feature network from {:?}", model_path);

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.intra_threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                FatigueError::FeatureNetwork(format!("Failed to load {:?}: {}", model_path, e))
            })?;

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            layout: config.layout,
        })
    }
}

impl FeatureNetwork for OnnxFeatureNetwork {
    fn embed(&mut self, image: Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(image)
            .map_err(|e| FatigueError::FeatureNetwork(format!("Tensor creation error: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| FatigueError::FeatureNetwork(format!("Inference error: {}", e)))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| FatigueError::FeatureNetwork("Network produced no output".to_string()))?;

        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| FatigueError::FeatureNetwork(format!("Output extraction error: {}", e)))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        log::debug!("Feature map shape: {:?}", dims);

        flatten_feature_map(data, &dims, self.layout)
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn name(&self) -> &str {
        "VGG19 (ONNX)"
    }
}

/// Flatten a feature map into (height, width, channels) order.
///
/// Channels-first maps are permuted so the vector matches the channels-last
/// order the reduction transform was fitted on.
fn flatten_feature_map(data: &[f32], dims: &[usize], layout: TensorLayout) -> Result<Vec<f32>> {
    match (layout, dims) {
        (TensorLayout::Nchw, &[n, c, h, w]) if c == FEATURE_MAP_CHANNELS => {
            let view = ArrayView4::from_shape((n, c, h, w), data)
                .map_err(|e| {
                    FatigueError::FeatureNetwork(format!("Feature map shape error: {}", e))
                })?;
            Ok(view.permuted_axes([0, 2, 3, 1]).iter().copied().collect())
        }
        _ => Ok(data.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nhwc_feature_map_is_flattened_as_is() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let flat = flatten_feature_map(&data, &[1, 2, 3, 4], TensorLayout::Nhwc).unwrap();
        assert_eq!(flat, data);
    }

    #[test]
    fn test_nchw_feature_map_is_permuted_to_channels_last() {
        // (1, 512, 1, 2): value encodes channel * 10 + column
        let mut data = vec![0.0f32; 512 * 2];
        for c in 0..512 {
            for w in 0..2 {
                data[c * 2 + w] = (c * 10 + w) as f32;
            }
        }
        let flat = flatten_feature_map(&data, &[1, 512, 1, 2], TensorLayout::Nchw).unwrap();
        assert_eq!(flat[0], 0.0);
        assert_eq!(flat[1], 10.0);
        assert_eq!(flat[511], 5110.0);
        assert_eq!(flat[512], 1.0);
    }
}
