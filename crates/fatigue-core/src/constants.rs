//! Fixed preprocessing parameters.
//!
//! These match the parameters the PCA and ensemble artifacts were fitted with.
//! Changing any of them invalidates the artifacts, so they are not configurable.

/// Analysis sample rate (Hz)
pub const SAMPLE_RATE: u32 = 8000;

/// Clip duration after padding/truncation
pub const TARGET_SECONDS: usize = 50;

/// Samples in a normalized waveform (50 s at 8 kHz)
pub const TARGET_SAMPLES: usize = TARGET_SECONDS * SAMPLE_RATE as usize;

pub const N_FFT: usize = 8192;
pub const HOP_LENGTH: usize = 4096;
pub const N_MELS: usize = 196;

/// Side length of the square log-mel spectrogram (mel bands x frames)
pub const SPECTROGRAM_SIZE: usize = 196;

/// VGG19 feature map without the classification head: 6 x 6 x 512
pub const FEATURE_MAP_SIDE: usize = 6;
pub const FEATURE_MAP_CHANNELS: usize = 512;
pub const EMBEDDING_DIM: usize = FEATURE_MAP_SIDE * FEATURE_MAP_SIDE * FEATURE_MAP_CHANNELS;

/// Per-channel ImageNet means in BGR order (Keras "caffe" preprocessing)
pub const VGG_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

pub const DEFAULT_PCA_FILENAME: &str = "pca_women.json";
pub const DEFAULT_CLASSIFIER_FILENAME: &str = "ensemble_women.onnx";
pub const DEFAULT_NETWORK_FILENAME: &str = "vgg19-notop-196.onnx";
