//! Audio loading
//!
//! Decodes an arbitrary audio file with Symphonia, downmixes to mono, resamples
//! to the analysis rate with rubato and normalizes the clip to exactly
//! `TARGET_SAMPLES` samples.

use std::fs::File;
use std::path::Path;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::constants::{SAMPLE_RATE, TARGET_SAMPLES};
use crate::error::{FatigueError, Result};

/// Input chunk size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded audio before any normalization (interleaved samples)
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Frames per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Mono clip at `SAMPLE_RATE` with exactly `TARGET_SAMPLES` samples
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform(Vec<f32>);

impl Waveform {
    /// Build a waveform from mono samples already at `SAMPLE_RATE`,
    /// truncating or zero-padding to the fixed length.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self(fix_length(samples, TARGET_SAMPLES))
    }

    pub fn samples(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Load an audio file as a fixed-length analysis waveform.
///
/// decode -> mono -> resample to 8 kHz -> truncate / zero-pad to 50 s
pub fn load_waveform(path: &Path) -> Result<Waveform> {
    let decoded = decode_audio(path)?;
    log::info!(
        "Decoded {:?}: {:.2}s, {}Hz, {} channel(s)",
        path,
        decoded.duration_secs(),
        decoded.sample_rate,
        decoded.channels
    );

    let mono = downmix_to_mono(&decoded);
    let resampled = resample(&mono, decoded.sample_rate, SAMPLE_RATE)
        .map_err(|e| FatigueError::decode(path, e))?;

    if resampled.len() < TARGET_SAMPLES {
        log::debug!(
            "Padding waveform with {} samples of silence",
            TARGET_SAMPLES - resampled.len()
        );
    } else if resampled.len() > TARGET_SAMPLES {
        log::debug!(
            "Truncating waveform by {} samples",
            resampled.len() - TARGET_SAMPLES
        );
    }

    Ok(Waveform::from_samples(resampled))
}

/// Decode an audio file to interleaved f32 samples using Symphonia
pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|e| FatigueError::decode(path, e))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FatigueError::decode(path, e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FatigueError::decode(path, "no audio track found"))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| FatigueError::decode(path, "unknown sample rate"))?;

    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FatigueError::decode(path, e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        let needed = decoded.capacity() * spec.channels.count();

        // Reallocate if a later packet is larger than the first one
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(FatigueError::decode(path, "no audio samples decoded"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}

/// Average interleaved channels into a mono signal
pub fn downmix_to_mono(audio: &DecodedAudio) -> Vec<f32> {
    let channels = audio.channels.max(1) as usize;
    if channels == 1 {
        return audio.samples.clone();
    }
    audio
        .samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a mono signal with rubato's FFT resampler.
///
/// The output has `ceil(len * to / from)` samples with the resampler's
/// delay removed.
pub fn resample(samples: &[f32], from: u32, to: u32) -> std::result::Result<Vec<f32>, String> {
    if from == 0 || to == 0 {
        return Err(format!("invalid sample rate conversion {} -> {}", from, to));
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| format!("Resampler init failed: {}", e))?;

    let expected = (samples.len() as u64 * to as u64).div_ceil(from as u64) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= samples.len() {
        let n = resampler.input_frames_next();
        let frame: [&[f32]; 1] = [&samples[pos..pos + n]];
        let chunk = resampler
            .process(&frame[..], None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        output.extend_from_slice(&chunk[0]);
        pos += n;
    }

    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the samples still held back by the resampler delay
    while output.len() < expected + delay {
        let chunk = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

/// Keep the first `target` samples, or zero-pad the tail up to `target`
pub fn fix_length(mut samples: Vec<f32>, target: usize) -> Vec<f32> {
    samples.resize(target, 0.0);
    samples
}
