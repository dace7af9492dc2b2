//! Text contract between the `predict` binary and its callers
//!
//! Exactly three lines on stdout:
//!
//! ```text
//! Artifact dir: <dir>
//! Predicted label: <int>
//! Predicted probability (positive class or max): <float>
//! ```
//!
//! Callers scrape the label and probability with the regexes in
//! [`parse_output`], so the markers must never change.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::predictor::Prediction;
use crate::spectrogram::ShapeCorrection;

pub const ARTIFACT_DIR_MARKER: &str = "Artifact dir:";
pub const LABEL_MARKER: &str = "Predicted label:";
pub const PROBABILITY_MARKER: &str = "Predicted probability (positive class or max):";

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Predicted label: (\d+)").expect("label pattern is valid"));
static PROBABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Predicted probability.*: ([0-9.]+)").expect("probability pattern is valid")
});

/// Everything the pipeline produced for one recording
#[derive(Debug, Clone)]
pub struct PredictionReport {
    pub artifact_dir: PathBuf,
    pub prediction: Prediction,
    /// Diagnostic only; never printed on stdout
    pub shape_correction: Option<ShapeCorrection>,
}

pub fn render_report(report: &PredictionReport) -> String {
    format!(
        "{} {}\n{} {}\n{} {}\n",
        ARTIFACT_DIR_MARKER,
        report.artifact_dir.display(),
        LABEL_MARKER,
        report.prediction.label,
        PROBABILITY_MARKER,
        report.prediction.probability
    )
}

pub fn write_report<W: Write>(out: &mut W, report: &PredictionReport) -> io::Result<()> {
    out.write_all(render_report(report).as_bytes())?;
    out.flush()
}

/// Label and probability scraped from `predict` output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedOutput {
    pub label: Option<u32>,
    pub probability: Option<f32>,
}

pub fn parse_output(text: &str) -> ParsedOutput {
    let label = LABEL_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let probability = PROBABILITY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    ParsedOutput { label, probability }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_render_three_lines() {
        let text = render_report(&report(1, 0.8));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Artifact dir: /srv/models",
                "Predicted label: 1",
                "Predicted probability (positive class or max): 0.8",
            ]
        );
    }

    #[test]
    fn test_rendered_output_parses_back() {
        let parsed = parse_output(&render_report(&report(0, 0.125)));
        assert_eq!(parsed.label, Some(0));
        assert_eq!(parsed.probability, Some(0.125));
    }

    #[test]
    fn test_parse_tolerates_surrounding_noise() {
        let text = concat!(
            "loading...\n",
            "Predicted label: 1\n",
            "Predicted probability (positive class or max): 0.93\n",
        );
        let parsed = parse_output(text);
        assert_eq!(parsed.label, Some(1));
        assert_eq!(parsed.probability, Some(0.93));
    }

    #[test]
    fn test_parse_missing_markers() {
        assert_eq!(parse_output("Traceback: boom"), ParsedOutput::default());
    }

    #[test]
    fn test_write_report() {
        let mut buf = Vec::new();
        write_report(&mut buf, &report(1, 0.5)).unwrap();
        assert!(String::from_utf8(buf).unwrap().ends_with("0.5\n"));
    }
}
