//! `predict` - fatigue prediction for a single voice recording
//!
//! Prints exactly three lines on stdout:
//!
//! ```text
//! Artifact dir: <dir>
//! Predicted label: <0|1>
//! Predicted probability (positive class or max): <float>
//! ```
//!
//! Diagnostics go to stderr (`RUST_LOG=info` for stage timings).
//!
//! ## Exit codes
//!
//! - `0`: success
//! - `1`: audio could not be decoded
//! - `2`: PCA/classifier artifacts not found
//! - `3`: prediction error (incompatible artifacts, bad classifier output)
//! - `4`: internal error (feature network, I/O, configuration)
//! - `64`: invalid command line

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use fatigue_core::artifacts::ArtifactRequest;
use fatigue_core::config::{load_config, resolve_config_path, FatigueConfig};
use fatigue_core::error::{ErrorKind, USAGE_EXIT_CODE};
use fatigue_core::report::{write_report, PredictionReport};
use fatigue_core::FatigueEngine;

#[derive(Parser, Debug)]
#[command(name = "predict", version, about = "Predict vocal fatigue from a voice recording")]
struct Cli {
    /// Audio file (wav, mp3, flac, ogg, m4a, ...)
    audio: PathBuf,

    /// Fitted PCA artifact (requires --model)
    #[arg(long, value_name = "PATH")]
    pca: Option<PathBuf>,

    /// Fitted ensemble classifier artifact (requires --pca)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Directory holding both artifacts, searched before the configured ones
    #[arg(long, value_name = "DIR")]
    artifact_dir: Option<PathBuf>,

    /// Feature network ONNX file (overrides the configured model/cache)
    #[arg(long, value_name = "PATH", env = "FATIGUE_NETWORK")]
    network: Option<PathBuf>,

    /// Configuration file (default: ~/.config/fatigue-coach/config.yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn artifact_request(&self) -> ArtifactRequest {
        ArtifactRequest {
            pca: self.pca.clone(),
            model: self.model.clone(),
            dir: self.artifact_dir.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version also arrive here, on stdout with status 0
            let _ = e.print();
            return exit_code(parse_exit_code(&e));
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    log::info!("predict starting up for {:?}", cli.audio);

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config: FatigueConfig = load_config(&config_path);
    config.validate();
    if let Some(network) = &cli.network {
        config.network.model_path = Some(network.clone());
    }

    let mut engine = FatigueEngine::new(config);
    let report = match engine.predict_file(&cli.audio, &cli.artifact_request()) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code(e.exit_code());
        }
    };

    match print_report(&report) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(ErrorKind::Internal.exit_code())
        }
    }
}

fn print_report(report: &PredictionReport) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), report).context("Failed to write prediction to stdout")
}

/// clap uses status 2 for usage errors, which would read as "artifact not found"
fn parse_exit_code(err: &clap::Error) -> i32 {
    if err.exit_code() == 0 {
        0
    } else {
        USAGE_EXIT_CODE
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_explicit_artifacts() {
        let cli = Cli::parse_from(["predict", "clip.wav", "--pca", "p.json", "--model", "m.onnx"]);
        let request = cli.artifact_request();
        assert_eq!(request.pca, Some(PathBuf::from("p.json")));
        assert_eq!(request.model, Some(PathBuf::from("m.onnx")));
        assert!(request.dir.is_none());
    }

    #[test]
    fn test_artifact_dir_flag() {
        let cli = Cli::parse_from(["predict", "clip.wav", "--artifact-dir", "/srv/models"]);
        assert_eq!(cli.artifact_request().dir, Some(PathBuf::from("/srv/models")));
    }

    #[test]
    fn test_audio_is_required() {
        let err = Cli::try_parse_from(["predict"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), USAGE_EXIT_CODE);
    }

    #[test]
    fn test_unknown_flag_is_not_artifact_not_found() {
        let err = Cli::try_parse_from(["predict", "clip.wav", "--bogus"]).unwrap_err();
        let code = parse_exit_code(&err);
        assert_eq!(code, USAGE_EXIT_CODE);
        assert_ne!(ErrorKind::from_exit_code(code), Some(ErrorKind::ArtifactNotFound));
        assert_eq!(ErrorKind::from_exit_code(code), Some(ErrorKind::Internal));
    }

    #[test]
    fn test_help_and_version_exit_zero() {
        for flag in ["--help", "--version"] {
            let err = Cli::try_parse_from(["predict", flag]).unwrap_err();
            assert_eq!(parse_exit_code(&err), 0, "{}", flag);
        }
    }
}
