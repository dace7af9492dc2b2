//! Fatigue Core - Vocal fatigue inference for the coaching backend
//!
//! Turns a short voice recording into a fatigued / not-fatigued prediction:
//!
//! 1. **Audio**: decode any common format, downmix, resample to 8 kHz and
//!    normalize to exactly 50 seconds.
//! 2. **Spectrogram**: 196x196 log-mel spectrogram.
//! 3. **Features**: frozen VGG19 (ONNX) embedding of the spectrogram image.
//! 4. **Artifacts + Predictor**: PCA projection and the fitted ensemble classifier.
//! 5. **Report**: the three-line text contract consumed by callers that run
//!    the `predict` binary as a subprocess.

pub mod artifacts;
pub mod assessment;
pub mod audio;
pub mod config;
pub mod constants;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod predictor;
pub mod report;
pub mod spectrogram;

pub use error::{ErrorKind, FatigueError, Result};
pub use pipeline::FatigueEngine;
