//! Log-mel spectrogram computation
//!
//! Pure Rust port of the librosa defaults the artifacts were trained with:
//! - Centered STFT (zero padding of `n_fft / 2` on both sides), periodic Hann window
//! - Power spectrum `|X|^2`
//! - Slaney mel scale with Slaney area normalization, 0 Hz to Nyquist
//! - `power_to_db` with `ref = 1.0`, `amin = 1e-10`, `top_db = 80`
//!
//! The output is forced to 196x196. With 50 s at 8 kHz and a 4096 hop the
//! transform yields 98 frames, so the time axis is zero-padded; the correction
//! is logged and recorded on the result rather than treated as an error.

use ndarray::{s, Array2};
use realfft::RealFftPlanner;

use crate::audio::Waveform;
use crate::constants::{HOP_LENGTH, N_FFT, N_MELS, SPECTROGRAM_SIZE};
use crate::error::{FatigueError, Result};

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;

/// Record of a forced resize of the raw spectrogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeCorrection {
    /// (mel bands, frames) before truncation/padding
    pub original: (usize, usize),
    /// (mel bands, frames) after truncation/padding
    pub corrected: (usize, usize),
}

/// 196x196 log-mel spectrogram (rows = mel bands, columns = frames)
#[derive(Debug, Clone)]
pub struct LogMelSpectrogram {
    data: Array2<f32>,
    correction: Option<ShapeCorrection>,
}

impl LogMelSpectrogram {
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Set when the raw transform had to be truncated or padded
    pub fn correction(&self) -> Option<ShapeCorrection> {
        self.correction
    }

    /// Wrap an existing 2D array, applying the same shape correction as `build_log_mel`
    pub fn from_array(data: Array2<f32>) -> Self {
        let (data, correction) = fix_shape(data, SPECTROGRAM_SIZE, SPECTROGRAM_SIZE);
        Self { data, correction }
    }
}

/// Compute the fixed-size log-mel spectrogram of a normalized waveform.
pub fn build_log_mel(waveform: &Waveform) -> Result<LogMelSpectrogram> {
    let mel = mel_spectrogram(
        waveform.samples(),
        waveform.sample_rate(),
        N_FFT,
        HOP_LENGTH,
        N_MELS,
    )?;
    let log_mel = power_to_db(&mel);

    let spectrogram = LogMelSpectrogram::from_array(log_mel);
    if let Some(correction) = spectrogram.correction {
        log::warn!(
            "Log-mel spectrogram shape {:?} corrected to {:?} by truncation/zero-padding",
            correction.original,
            correction.corrected
        );
    }
    Ok(spectrogram)
}

/// Mel power spectrogram, shape (n_mels, n_frames)
pub fn mel_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop: usize,
    n_mels: usize,
) -> Result<Array2<f32>> {
    let power = stft_power(samples, n_fft, hop)?;
    let filters = mel_filterbank(sample_rate, n_fft, n_mels);
    log::debug!(
        "STFT: {} bins x {} frames, filterbank {:?}",
        power.nrows(),
        power.ncols(),
        filters.dim()
    );
    Ok(filters.dot(&power))
}

/// Centered power STFT, shape (n_fft / 2 + 1, n_frames)
pub fn stft_power(signal: &[f32], n_fft: usize, hop: usize) -> Result<Array2<f32>> {
    if n_fft == 0 || hop == 0 {
        return Err(FatigueError::Spectrogram(format!(
            "invalid STFT parameters n_fft={} hop={}",
            n_fft, hop
        )));
    }

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; signal.len() + 2 * pad];
    padded[pad..pad + signal.len()].copy_from_slice(signal);

    let num_frames = (padded.len() - n_fft) / hop + 1;
    let num_bins = n_fft / 2 + 1;

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    // Periodic Hann window (scipy `get_window("hann", n, fftbins=True)`)
    let window: Vec<f32> = (0..n_fft)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / n_fft as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect();

    let mut power = Array2::<f32>::zeros((num_bins, num_frames));
    let mut scratch = fft.make_scratch_vec();
    let mut frame_buf = vec![0.0f32; n_fft];
    let mut spectrum = fft.make_output_vec();

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop;
        for i in 0..n_fft {
            frame_buf[i] = padded[start + i] * window[i];
        }

        fft.process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
            .map_err(|e| FatigueError::Spectrogram(format!("FFT failed: {:?}", e)))?;

        for (bin, c) in spectrum.iter().enumerate() {
            power[[bin, frame_idx]] = c.re * c.re + c.im * c.im;
        }
    }

    Ok(power)
}

/// Slaney-normalized mel filterbank, shape (n_mels, n_fft / 2 + 1)
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let fft_freqs: Vec<f64> = (0..n_bins).map(|i| i as f64 * sr / n_fft as f64).collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sr / 2.0);
    let mel_freqs: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = Array2::<f32>::zeros((n_mels, n_bins));
    for m in 0..n_mels {
        let left = mel_freqs[m];
        let center = mel_freqs[m + 1];
        let right = mel_freqs[m + 2];
        let enorm = 2.0 / (right - left);

        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);
            filters[[m, bin]] = (weight * enorm) as f32;
        }
    }

    filters
}

/// Convert a power spectrogram to decibels relative to 1.0, floored at `max - 80 dB`
pub fn power_to_db(power: &Array2<f32>) -> Array2<f32> {
    let log_spec = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    let max = log_spec.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = max - TOP_DB;
    log_spec.mapv(|v| v.max(floor))
}

/// Truncate or zero-pad each axis independently to (rows, cols).
///
/// Returns the correction applied, if any.
pub fn fix_shape(
    array: Array2<f32>,
    rows: usize,
    cols: usize,
) -> (Array2<f32>, Option<ShapeCorrection>) {
    let original = array.dim();
    if original == (rows, cols) {
        return (array, None);
    }

    let keep_rows = original.0.min(rows);
    let keep_cols = original.1.min(cols);

    let mut fixed = Array2::<f32>::zeros((rows, cols));
    fixed
        .slice_mut(s![..keep_rows, ..keep_cols])
        .assign(&array.slice(s![..keep_rows, ..keep_cols]));

    (
        fixed,
        Some(ShapeCorrection {
            original,
            corrected: (rows, cols),
        }),
    )
}

// Slaney mel scale: linear below 1 kHz, logarithmic above
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}
