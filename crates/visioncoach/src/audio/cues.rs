//! Cue samples: WAV decode, mono downmix, resample, synthesized fallbacks
//!
//! All decoding happens once at startup. The bank then hands out shared
//! `Arc<[f32]>` buffers at the engine's sample rate.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use coachconf::MediaConfig;
use tracing::{info, warn};

use super::AudioError;

/// Decoded audio ready for playback
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (L, R, L, R, ...)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl DecodedAudio {
    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Mono downmix, linearly resampled to `target_rate`
    pub fn resampled_mono(&self, target_rate: u32) -> Vec<f32> {
        resample_linear(&self.to_mono(), self.sample_rate, target_rate)
    }
}

/// Decode WAV bytes with hound. Integer formats are scaled to -1.0..1.0.
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

pub fn load_wav(path: &Path) -> Result<DecodedAudio, AudioError> {
    let data = std::fs::read(path).map_err(|source| AudioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_wav(&data)
}

fn resample_linear(input: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || from == 0 || to == 0 || input.is_empty() {
        return input.to_vec();
    }

    let step = from as f64 / to as f64;
    let len = ((input.len() as f64) / step).round().max(1.0) as usize;
    let last = input.len() - 1;

    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            let a = input[idx];
            let b = input[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

/// Attack/decay envelope so cues never click
fn envelope(i: usize, len: usize, attack: usize) -> f32 {
    let attack = attack.max(1);
    let rise = (i as f32 / attack as f32).min(1.0);
    let fall = 1.0 - i as f32 / len.max(1) as f32;
    rise * fall
}

fn tone(freq: f64, seconds: f64, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let len = (seconds * sample_rate as f64).round() as usize;
    let attack = sample_rate as usize / 200;
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let s = (2.0 * std::f64::consts::PI * freq * t).sin() as f32;
            s * amplitude * envelope(i, len, attack)
        })
        .collect()
}

/// Short A5 blip
pub fn synth_beep(sample_rate: u32) -> Vec<f32> {
    tone(880.0, 0.12, sample_rate, 0.6)
}

/// Rising major arpeggio, C5 E5 G5 C6
pub fn synth_finale(sample_rate: u32) -> Vec<f32> {
    [523.25, 659.25, 783.99, 1046.5]
        .iter()
        .enumerate()
        .flat_map(|(i, &freq)| {
            let seconds = if i == 3 { 0.6 } else { 0.15 };
            tone(freq, seconds, sample_rate, 0.6)
        })
        .collect()
}

/// Beep and finale buffers at one sample rate
#[derive(Debug, Clone)]
pub struct CueBank {
    sample_rate: u32,
    beep: Arc<[f32]>,
    finale: Arc<[f32]>,
}

impl CueBank {
    pub fn from_samples(sample_rate: u32, beep: Vec<f32>, finale: Vec<f32>) -> Self {
        Self {
            sample_rate,
            beep: beep.into(),
            finale: finale.into(),
        }
    }

    /// Built-in tones only
    pub fn synthesized(sample_rate: u32) -> Self {
        Self::from_samples(sample_rate, synth_beep(sample_rate), synth_finale(sample_rate))
    }

    /// Load configured samples, falling back to synthesized tones per cue
    pub fn load(media: &MediaConfig, sample_rate: u32) -> Self {
        let beep = load_or_synth("beep", media.beep_sample.as_deref(), sample_rate, synth_beep);
        let finale = load_or_synth(
            "finale",
            media.finale_sample.as_deref(),
            sample_rate,
            synth_finale,
        );
        Self::from_samples(sample_rate, beep, finale)
    }

    pub fn beep(&self) -> Arc<[f32]> {
        Arc::clone(&self.beep)
    }

    pub fn finale(&self) -> Arc<[f32]> {
        Arc::clone(&self.finale)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn load_or_synth(
    name: &str,
    path: Option<&Path>,
    sample_rate: u32,
    synth: fn(u32) -> Vec<f32>,
) -> Vec<f32> {
    let Some(path) = path else {
        return synth(sample_rate);
    };

    match load_wav(path) {
        Ok(audio) => {
            info!(
                "loaded {} cue from {} ({} samples, {}Hz, {}ch)",
                name,
                path.display(),
                audio.samples.len(),
                audio.sample_rate,
                audio.channels
            );
            audio.resampled_mono(sample_rate)
        }
        Err(e) => {
            warn!("{} cue unusable, using built-in tone: {}", name, e);
            synth(sample_rate)
        }
    }
}
