//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Infrastructure settings, flattened into the top level of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InfraConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub media: MediaConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or tracing filter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Audio output format for the feedback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output stream name as shown by the audio server.
    /// Default: visioncoach
    #[serde(default = "AudioConfig::default_stream_name")]
    pub stream_name: String,

    /// Default: 48000
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// Default: 2
    #[serde(default = "AudioConfig::default_channels")]
    pub channels: u32,

    /// Frames per output callback (~5.3ms at 48kHz for 256).
    #[serde(default = "AudioConfig::default_latency_frames")]
    pub latency_frames: u32,

    /// Linear master gain applied to every cue, 0.0-1.0.
    #[serde(default = "AudioConfig::default_gain")]
    pub gain: f32,
}

impl AudioConfig {
    fn default_stream_name() -> String {
        "visioncoach".to_string()
    }

    fn default_sample_rate() -> u32 {
        48000
    }

    fn default_channels() -> u32 {
        2
    }

    fn default_latency_frames() -> u32 {
        256
    }

    fn default_gain() -> f32 {
        0.8
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            stream_name: Self::default_stream_name(),
            sample_rate: Self::default_sample_rate(),
            channels: Self::default_channels(),
            latency_frames: Self::default_latency_frames(),
            gain: Self::default_gain(),
        }
    }
}

/// Cue sample files. Unset paths fall back to synthesized cues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaConfig {
    /// WAV file played (pitch shifted) for every counted rep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beep_sample: Option<PathBuf>,

    /// WAV file played once when the finale rep is reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finale_sample: Option<PathBuf>,
}
