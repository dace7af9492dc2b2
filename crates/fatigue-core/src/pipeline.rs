//! End-to-end fatigue inference
//!
//! ```text
//! resolve artifacts -> load waveform -> log-mel -> embedding -> load artifacts -> predict
//! ```
//!
//! Artifact paths are resolved before any audio is decoded so a missing
//! artifact fails fast. The feature network is loaded on first use and kept
//! for the lifetime of the engine; the fitted artifacts are read per call.

use std::path::Path;

use crate::artifacts::{ArtifactLoader, ArtifactLocator, ArtifactRequest, FileArtifactLoader};
use crate::audio::load_waveform;
use crate::config::FatigueConfig;
use crate::error::Result;
use crate::features::{extract_embedding, FeatureNetwork, NetworkModelManager, OnnxFeatureNetwork};
use crate::predictor::predict;
use crate::report::PredictionReport;
use crate::spectrogram::build_log_mel;

pub struct FatigueEngine {
    config: FatigueConfig,
    locator: ArtifactLocator,
    loader: Box<dyn ArtifactLoader>,
    network: Option<Box<dyn FeatureNetwork>>,
}

impl FatigueEngine {
    pub fn new(config: FatigueConfig) -> Self {
        let locator = ArtifactLocator::from_config(&config.artifacts);
        let loader = Box::new(FileArtifactLoader::new(&config.artifacts));
        Self {
            config,
            locator,
            loader,
            network: None,
        }
    }

    /// Replace the candidate directory list
    pub fn with_locator(mut self, locator: ArtifactLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Use an already-loaded feature network instead of the configured ONNX model
    pub fn with_network(mut self, network: Box<dyn FeatureNetwork>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_artifact_loader(mut self, loader: Box<dyn ArtifactLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    pub fn predict_file(
        &mut self,
        audio_path: &Path,
        request: &ArtifactRequest,
    ) -> Result<PredictionReport> {
        let paths = self.locator.resolve(request)?;
        log::info!("Artifact dir: {:?}", paths.dir);

        let waveform = load_waveform(audio_path)?;
        log::info!(
            "Loaded {:?}: {} samples at {} Hz",
            audio_path,
            waveform.len(),
            waveform.sample_rate()
        );

        let spectrogram = build_log_mel(&waveform)?;
        log::debug!("Log-mel spectrogram shape: {:?}", spectrogram.shape());

        let embedding = extract_embedding(self.network()?, &spectrogram)?;
        log::debug!("Embedding: {} values", embedding.len());

        let mut artifacts = self.loader.load(&paths)?;
        let prediction = predict(
            &embedding,
            artifacts.reducer.as_ref(),
            artifacts.classifier.as_mut(),
        )?;

        Ok(PredictionReport {
            artifact_dir: paths.dir,
            prediction,
            shape_correction: spectrogram.correction(),
        })
    }

    fn network(&mut self) -> Result<&mut dyn FeatureNetwork> {
        let network: Box<dyn FeatureNetwork> = match self.network.take() {
            Some(network) => network,
            None => {
                let manager = NetworkModelManager::from_config(&self.config.network)?;
                let model_path = manager.ensure_model()?;
                Box::new(OnnxFeatureNetwork::load(&model_path, &self.config.network)?)
            }
        };
        Ok(self.network.insert(network).as_mut())
    }
}
