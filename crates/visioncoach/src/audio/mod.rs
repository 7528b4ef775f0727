//! Audio feedback
//!
//! Beeps and the finale cue are rendered off the RT path (decode, resample,
//! pitch shift) and handed to the engine as ready-to-play mono buffers. The
//! engine forwards them over a lock-free ring to a renderer that the output
//! backend drives from its own thread.
//!
//! ```text
//! frame-processing task                    backend thread (RT)
//!        │                                        │
//!  FeedbackSequencer::handle_rep                  │
//!        │ pitch shift beep                       │
//!        ▼                                        ▼
//!  RingEngine::play ──► rtrb ring ──► VoiceRenderer::render
//!                     (EngineCommand)      mix voices → output
//! ```
//!
//! Nothing in here is allowed to fail the vision pipeline: the sequencer logs
//! and swallows every engine error.

use std::path::PathBuf;

pub mod cues;
pub mod engine;
pub mod pitch;
#[cfg(feature = "pipewire")]
pub mod pipewire_output;
pub mod sequencer;

pub use cues::{decode_wav, CueBank, DecodedAudio};
pub use engine::{
    default_backend, AudioEngine, Cue, CueKind, EngineCommand, EngineConfig, OfflineBackend,
    OfflineTap, OutputBackend, RingEngine, UnavailableBackend, VoiceRenderer,
};
pub use pitch::{cents_to_ratio, PitchShifter};
pub use sequencer::{beep_cents, FeedbackSequencer, SequencerConfig};

/// Errors from the audio subsystem. Never propagated past the sequencer.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio output not available: {0}")]
    NotAvailable(String),

    #[error("audio engine is not running")]
    NotRunning,

    #[error("audio command queue is full")]
    QueueFull,

    #[error("failed to initialize audio output: {0}")]
    Init(String),

    #[error("failed to spawn audio thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode WAV: {0}")]
    Decode(#[from] hound::Error),

    #[error("audio file has no samples")]
    Empty,
}
