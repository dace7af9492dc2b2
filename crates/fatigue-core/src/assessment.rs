//! Upload boundary for the coaching backend
//!
//! The HTTP layer hands over raw upload bytes and gets back a
//! [`FatigueAssessment`], the JSON object the frontend consumes. Two ways to
//! run the pipeline:
//!
//! - **In-process** ([`AssessmentService`]): one long-lived [`FatigueEngine`],
//!   so the feature network is loaded once.
//! - **Subprocess** ([`SubprocessPredictor`]): runs the `predict` binary and
//!   scrapes its stdout, for deployments that keep ONNX Runtime out of the
//!   server process.
//!
//! Browser uploads are usually WebM/Opus, which symphonia cannot decode, so
//! uploads are first transcoded with ffmpeg to 8 kHz mono WAV. When ffmpeg is
//! missing or fails, the original upload is used as-is.
//!
//! All temporary files are owned by `tempfile` handles and removed when the
//! handle drops, whichever way the assessment ends.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tempfile::{NamedTempFile, TempPath};

use crate::artifacts::ArtifactRequest;
use crate::config::{FatigueConfig, TranscodeConfig};
use crate::constants::SAMPLE_RATE;
use crate::error::{ErrorKind, FatigueError, Result};
use crate::pipeline::FatigueEngine;
use crate::report::{parse_output, PredictionReport};

/// Characters of raw output echoed back when no label could be parsed
const OUTPUT_EXCERPT_CHARS: usize = 200;

/// Response shape of the fatigue endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FatigueAssessment {
    pub success: bool,
    pub tired: Option<bool>,
    pub probability: Option<f32>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FatigueAssessment {
    pub fn failure(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            success: false,
            tired: None,
            probability: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    pub fn from_result(result: Result<PredictionReport>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                tired: Some(report.prediction.is_fatigued()),
                probability: Some(report.prediction.probability),
                error: None,
                error_kind: None,
            },
            Err(e) => Self::failure(e.to_string(), e.kind()),
        }
    }

    /// Interpret the combined stdout/stderr of a `predict` run
    ///
    /// A parsed label means success even if the exit status says otherwise;
    /// the status only picks the error kind when nothing could be parsed.
    pub fn from_predict_output(output: &str, exit_code: Option<i32>) -> Self {
        let parsed = parse_output(output);

        match parsed.label {
            Some(label) => Self {
                success: true,
                tired: Some(label == 1),
                probability: parsed.probability,
                error: None,
                error_kind: None,
            },
            None => {
                let excerpt: String = output.chars().take(OUTPUT_EXCERPT_CHARS).collect();
                let kind = exit_code
                    .and_then(ErrorKind::from_exit_code)
                    .unwrap_or(ErrorKind::Internal);
                Self {
                    probability: parsed.probability,
                    ..Self::failure(format!("Prediction failed. Output: {}...", excerpt), kind)
                }
            }
        }
    }
}

/// Audio file handed to the pipeline
#[derive(Debug)]
pub enum PreparedAudio {
    /// ffmpeg output, deleted on drop
    Transcoded(TempPath),
    /// The upload itself
    Original(PathBuf),
}

impl PreparedAudio {
    pub fn path(&self) -> &Path {
        match self {
            PreparedAudio::Transcoded(path) => path,
            PreparedAudio::Original(path) => path,
        }
    }

    pub fn is_transcoded(&self) -> bool {
        matches!(self, PreparedAudio::Transcoded(_))
    }
}

/// External transcoder: `ffmpeg [args] -i <in> -ar 8000 -ac 1 -y <out.wav>`
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    args: Vec<String>,
    enabled: bool,
    scratch_dir: Option<PathBuf>,
}

impl Transcoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            enabled: config.enabled,
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TranscodeConfig {
            enabled: false,
            ..TranscodeConfig::default()
        })
    }

    /// Convert to 8 kHz mono WAV, falling back to the input file on any failure
    pub fn prepare(&self, input: &Path) -> PreparedAudio {
        if !self.enabled {
            return PreparedAudio::Original(input.to_path_buf());
        }
        match self.transcode(input) {
            Ok(path) => PreparedAudio::Transcoded(path),
            Err(e) => {
                log::warn!("{}; using original upload {:?}", e, input);
                PreparedAudio::Original(input.to_path_buf())
            }
        }
    }

    fn transcode(&self, input: &Path) -> Result<TempPath> {
        let output_path =
            scratch_file(self.scratch_dir.as_deref(), "fatigue_transcode_", ".wav")?
                .into_temp_path();

        log::info!("Transcoding {:?} with {:?}", input, self.program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("-i")
            .arg(input)
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg("1")
            .arg("-y")
            .arg(output_path.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                FatigueError::Transcode(format!("Failed to run {:?}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FatigueError::Transcode(format!(
                "{:?} exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(output_path)
    }
}

/// Named temp file in `dir`, or in the system temp dir
fn scratch_file(dir: Option<&Path>, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

/// In-process assessment of uploaded recordings
pub struct AssessmentService {
    engine: FatigueEngine,
    transcoder: Transcoder,
    request: ArtifactRequest,
    scratch_dir: Option<PathBuf>,
}

impl AssessmentService {
    pub fn new(config: FatigueConfig) -> Self {
        let transcoder = Transcoder::new(&config.transcode);
        let scratch_dir = config.transcode.scratch_dir.clone();
        Self::with_engine(FatigueEngine::new(config), transcoder).with_scratch_dir(scratch_dir)
    }

    pub fn with_engine(engine: FatigueEngine, transcoder: Transcoder) -> Self {
        Self {
            engine,
            transcoder,
            request: ArtifactRequest::default(),
            scratch_dir: None,
        }
    }

    /// Directory uploads are staged in (system temp dir when `None`)
    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }

    /// Artifact locations used for every upload
    pub fn with_request(mut self, request: ArtifactRequest) -> Self {
        self.request = request;
        self
    }

    /// Assess one upload. `suffix` is the upload's extension, e.g. `webm`.
    pub fn assess_upload(&mut self, bytes: &[u8], suffix: &str) -> FatigueAssessment {
        log::info!("Assessing upload: {} bytes ({})", bytes.len(), suffix);
        match self.run(bytes, suffix) {
            Ok(report) => FatigueAssessment::from_result(Ok(report)),
            Err(e) => {
                log::warn!("Fatigue assessment failed: {}", e);
                FatigueAssessment::from_result(Err(e))
            }
        }
    }

    fn run(&mut self, bytes: &[u8], suffix: &str) -> Result<PredictionReport> {
        let suffix = format!(".{}", suffix.trim_start_matches('.'));
        let mut upload = scratch_file(self.scratch_dir.as_deref(), "fatigue_upload_", &suffix)?;
        upload.write_all(bytes)?;
        upload.flush()?;

        let prepared = self.transcoder.prepare(upload.path());
        log::debug!(
            "Running pipeline on {:?} (transcoded: {})",
            prepared.path(),
            prepared.is_transcoded()
        );
        self.engine.predict_file(prepared.path(), &self.request)
    }
}

/// Runs the `predict` binary as a child process
#[derive(Debug, Clone)]
pub struct SubprocessPredictor {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl SubprocessPredictor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the audio path (e.g. a wrapper script)
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn assess(&self, audio: &Path, request: &ArtifactRequest) -> FatigueAssessment {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).arg(audio);
        if let Some(pca) = &request.pca {
            command.arg("--pca").arg(pca);
        }
        if let Some(model) = &request.model {
            command.arg("--model").arg(model);
        }
        if let Some(dir) = &request.dir {
            command.arg("--artifact-dir").arg(dir);
        }

        log::info!("Running {:?} on {:?}", self.program, audio);

        let output = match command.stdin(Stdio::null()).output() {
            Ok(output) => output,
            Err(e) => {
                return FatigueAssessment::failure(
                    format!("Failed to run {:?}: {}", self.program, e),
                    ErrorKind::Internal,
                )
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        log::debug!("predict exited with {:?}", output.status.code());

        FatigueAssessment::from_predict_output(&combined, output.status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Prediction;

    fn report(label: i64, probability: f32) -> PredictionReport {
        PredictionReport {
            artifact_dir: PathBuf::from("/srv/models"),
            prediction: Prediction {
                label,
                probability,
                probabilities: vec![1.0 - probability, probability],
            },
            shape_correction: None,
        }
    }

    #[test]
    fn test_from_result_success() {
        let assessment = FatigueAssessment::from_result(Ok(report(1, 0.75)));
        assert!(assessment.success);
        assert_eq!(assessment.tired, Some(true));
        assert_eq!(assessment.probability, Some(0.75));
    }

    #[test]
    fn test_from_result_error_keeps_kind() {
        let err = FatigueError::ArtifactNotFound("none".into());
        let assessment = FatigueAssessment::from_result(Err(err));
        assert!(!assessment.success);
        assert_eq!(assessment.error_kind, Some(ErrorKind::ArtifactNotFound));
        assert!(assessment.error.unwrap().contains("none"));
    }

    #[test]
    fn test_from_output_not_tired() {
        let out = concat!(
            "Artifact dir: /m\n",
            "Predicted label: 0\n",
            "Predicted probability (positive class or max): 0.12\n",
        );
        let assessment = FatigueAssessment::from_predict_output(out, Some(0));
        assert!(assessment.success);
        assert_eq!(assessment.tired, Some(false));
        assert_eq!(assessment.probability, Some(0.12));
    }

    #[test]
    fn test_from_output_without_label_truncates() {
        let out = "x".repeat(500);
        let assessment = FatigueAssessment::from_predict_output(&out, Some(1));
        assert!(!assessment.success);
        assert_eq!(assessment.error_kind, Some(ErrorKind::Decode));
        let expected = format!("Prediction failed. Output: {}...", "x".repeat(200));
        assert_eq!(assessment.error.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_from_output_killed_process_is_internal() {
        let assessment = FatigueAssessment::from_predict_output("", None);
        assert_eq!(assessment.error_kind, Some(ErrorKind::Internal));
    }

    #[test]
    fn test_json_shape() {
        let assessment = FatigueAssessment::from_result(Ok(report(1, 0.5)));
        let json = serde_json::to_value(assessment).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["tired"], true);
        assert_eq!(json["probability"], 0.5);
        assert!(json["error"].is_null());
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn test_disabled_transcoder_uses_original() {
        let prepared = Transcoder::disabled().prepare(Path::new("/tmp/upload.webm"));
        assert!(!prepared.is_transcoded());
        assert_eq!(prepared.path(), Path::new("/tmp/upload.webm"));
    }

    #[test]
    fn test_missing_transcoder_falls_back() {
        let transcoder = Transcoder::new(&TranscodeConfig {
            program: PathBuf::from("/nonexistent/ffmpeg"),
            ..TranscodeConfig::default()
        });
        let prepared = transcoder.prepare(Path::new("/tmp/upload.webm"));
        assert!(!prepared.is_transcoded());
    }

    /// `sh -c <script> transcode -i in -ar 8000 -ac 1 -y out`: $2 is the input, $8 the output
    #[cfg(unix)]
    fn copying_transcoder(scratch: &Path) -> Transcoder {
        Transcoder::new(&TranscodeConfig {
            enabled: true,
            program: PathBuf::from("sh"),
            args: vec![
                String::from("-c"),
                String::from("cp \"$2\" \"$8\""),
                String::from("transcode"),
            ],
            scratch_dir: Some(scratch.to_path_buf()),
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_transcoded_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload.webm");
        std::fs::write(&input, b"not really webm").unwrap();

        let prepared = copying_transcoder(scratch.path()).prepare(&input);
        assert!(prepared.is_transcoded());
        assert!(prepared.path().starts_with(scratch.path()));
        assert_eq!(std::fs::read(prepared.path()).unwrap(), b"not really webm");

        let transcoded = prepared.path().to_path_buf();
        drop(prepared);
        assert!(!transcoded.exists());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_transcoder_cleans_up_output() {
        let scratch = tempfile::tempdir().unwrap();
        let transcoder = Transcoder::new(&TranscodeConfig {
            enabled: true,
            program: PathBuf::from("sh"),
            args: vec![String::from("-c"), String::from("exit 1"), String::from("transcode")],
            scratch_dir: Some(scratch.path().to_path_buf()),
        });
        let prepared = transcoder.prepare(Path::new("/tmp/upload.webm"));
        assert!(!prepared.is_transcoded());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_subprocess_spawn_failure() {
        let predictor = SubprocessPredictor::new("/nonexistent/predict");
        let assessment = predictor.assess(Path::new("a.wav"), &ArtifactRequest::default());
        assert!(!assessment.success);
        assert_eq!(assessment.error_kind, Some(ErrorKind::Internal));
    }

    #[cfg(unix)]
    #[test]
    fn test_subprocess_output_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("predict.sh");
        std::fs::write(
            &script,
            concat!(
                "echo \"Artifact dir: $3\"\n",
                "echo 'Predicted label: 1'\n",
                "echo 'Predicted probability (positive class or max): 0.66'\n",
            ),
        )
        .unwrap();

        let predictor = SubprocessPredictor::new("sh").with_leading_args([script.as_os_str()]);
        let request = ArtifactRequest::in_dir(dir.path());
        let assessment = predictor.assess(Path::new("clip.wav"), &request);
        assert!(assessment.success);
        assert_eq!(assessment.tired, Some(true));
        assert_eq!(assessment.probability, Some(0.66));
    }

    #[cfg(unix)]
    #[test]
    fn test_subprocess_exit_code_maps_to_kind() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("predict.sh");
        std::fs::write(&script, "echo 'Artifacts not found' >&2\nexit 2\n").unwrap();

        let predictor = SubprocessPredictor::new("sh").with_leading_args([script.as_os_str()]);
        let assessment = predictor.assess(Path::new("clip.wav"), &ArtifactRequest::default());
        assert!(!assessment.success);
        assert_eq!(assessment.error_kind, Some(ErrorKind::ArtifactNotFound));
        assert!(assessment.error.unwrap().contains("Artifacts not found"));
    }
}
