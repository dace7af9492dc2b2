//! Spectrogram embedding via a frozen pretrained image network
//!
//! # Architecture
//!
//! - **Image preparation** (`prepare_image`): the single-channel spectrogram is
//!   stacked into a 3-channel image and normalized the way Keras' VGG19
//!   `preprocess_input` does ("caffe" mode).
//! - **Network** (`FeatureNetwork` trait): forward pass producing the flattened
//!   6x6x512 feature map. `OnnxFeatureNetwork` runs the exported VGG19 with ort.
//! - **Model management** (`models.rs`): locate or download the ONNX file.

mod models;
mod onnx;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::constants::{EMBEDDING_DIM, SPECTROGRAM_SIZE, VGG_MEAN_BGR};
use crate::error::{FatigueError, Result};
use crate::spectrogram::LogMelSpectrogram;

pub use models::NetworkModelManager;
pub use onnx::OnnxFeatureNetwork;

/// Memory layout of the network input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// (1, 196, 196, 3) - Keras/tf2onnx export
    #[default]
    Nhwc,
    /// (1, 3, 196, 196) - channels-first export
    Nchw,
}

/// Frozen feature network
///
/// Implementations receive an already-normalized image and must return the
/// flattened feature map in (height, width, channels) order.
pub trait FeatureNetwork {
    fn embed(&mut self, image: Array4<f32>) -> Result<Vec<f32>>;

    /// Layout the network expects its input in
    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }

    fn name(&self) -> &str;
}

/// Fixed-length spectrogram embedding (6 x 6 x 512 values)
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(FatigueError::FeatureNetwork(format!(
                "embedding has {} values, expected {}",
                values.len(),
                EMBEDDING_DIM
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FatigueError::FeatureNetwork(
                "embedding contains non-finite values".to_string(),
            ));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stack the spectrogram into three channels and apply VGG "caffe" normalization.
///
/// Keras flips RGB to BGR and subtracts the ImageNet channel means. All three
/// channels carry the same values, so the flip is a no-op and only the
/// per-channel mean differs.
pub fn prepare_image(spectrogram: &LogMelSpectrogram, layout: TensorLayout) -> Array4<f32> {
    let data = spectrogram.data();
    let n = SPECTROGRAM_SIZE;

    match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, n, n, 3), |(_, h, w, c)| {
            data[[h, w]] - VGG_MEAN_BGR[c]
        }),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, n, n), |(_, c, h, w)| {
            data[[h, w]] - VGG_MEAN_BGR[c]
        }),
    }
}

/// Run the feature network on a spectrogram and validate the embedding size.
pub fn extract_embedding(
    network: &mut dyn FeatureNetwork,
    spectrogram: &LogMelSpectrogram,
) -> Result<Embedding> {
    let image = prepare_image(spectrogram, network.layout());
    log::debug!("Running {} on image {:?}", network.name(), image.dim());
    let values = network.embed(image)?;
    Embedding::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    struct MeanPoolNetwork {
        calls: usize,
    }

    impl FeatureNetwork for MeanPoolNetwork {
        fn embed(&mut self, image: Array4<f32>) -> Result<Vec<f32>> {
            self.calls += 1;
            let mean = image.mean().unwrap_or(0.0);
            Ok((0..EMBEDDING_DIM).map(|i| mean + i as f32 * 1e-3).collect())
        }

        fn name(&self) -> &str {
            "mean-pool"
        }
    }

    struct TruncatedNetwork;

    impl FeatureNetwork for TruncatedNetwork {
        fn embed(&mut self, _image: Array4<f32>) -> Result<Vec<f32>> {
            Ok(vec![0.0; 512])
        }

        fn name(&self) -> &str {
            "truncated"
        }
    }

    fn spectrogram(value: f32) -> LogMelSpectrogram {
        LogMelSpectrogram::from_array(Array2::from_elem((196, 196), value))
    }

    #[test]
    fn test_prepare_image_nhwc_subtracts_channel_means() {
        let image = prepare_image(&spectrogram(-20.0), TensorLayout::Nhwc);
        assert_eq!(image.dim(), (1, 196, 196, 3));
        assert!((image[[0, 5, 7, 0]] - (-20.0 - 103.939)).abs() < 1e-4);
        assert!((image[[0, 5, 7, 1]] - (-20.0 - 116.779)).abs() < 1e-4);
        assert!((image[[0, 5, 7, 2]] - (-20.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_prepare_image_nchw_matches_nhwc() {
        let mut data = Array2::<f32>::zeros((196, 196));
        data[[3, 150]] = -42.0;
        let spec = LogMelSpectrogram::from_array(data);

        let nhwc = prepare_image(&spec, TensorLayout::Nhwc);
        let nchw = prepare_image(&spec, TensorLayout::Nchw);
        assert_eq!(nchw.dim(), (1, 3, 196, 196));
        for c in 0..3 {
            assert_eq!(nhwc[[0, 3, 150, c]], nchw[[0, c, 3, 150]]);
        }
    }

    #[test]
    fn test_extract_embedding_length_and_determinism() {
        let mut network = MeanPoolNetwork { calls: 0 };
        let spec = spectrogram(-35.0);
        let a = extract_embedding(&mut network, &spec).unwrap();
        let b = extract_embedding(&mut network, &spec).unwrap();
        assert_eq!(a.len(), EMBEDDING_DIM);
        assert_eq!(a, b);
        assert_eq!(network.calls, 2);
    }

    #[test]
    fn test_wrong_embedding_size_rejected() {
        let err = extract_embedding(&mut TruncatedNetwork, &spectrogram(0.0)).unwrap_err();
        assert!(matches!(err, FatigueError::FeatureNetwork(_)));
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[10] = f32::NAN;
        assert!(Embedding::new(values).is_err());
    }
}
