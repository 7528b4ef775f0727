//! Lock-free cue playback engine
//!
//! `RingEngine` owns the producer half of an SPSC command ring. The consumer
//! half lives inside a `VoiceRenderer`, which is moved into the output
//! backend's thread on `start()`. The sequencer never takes a lock to play a
//! cue; ordering and visibility come from the ring itself.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use portable_atomic::AtomicF32;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info};

use super::AudioError;

/// Voices mixed at once. Further Play commands are dropped until one ends.
const MAX_VOICES: usize = 16;

/// Output format and queue sizing for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// Frames per backend callback
    pub latency_frames: u32,
    /// Linear master gain, 0.0-1.0
    pub gain: f32,
    /// Commands that may be pending between two callbacks
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "visioncoach".to_string(),
            sample_rate: 48000,
            channels: 2,
            latency_frames: 256,
            gain: 0.8,
            queue_capacity: 64,
        }
    }
}

impl From<&coachconf::AudioConfig> for EngineConfig {
    fn from(config: &coachconf::AudioConfig) -> Self {
        Self {
            name: config.stream_name.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            latency_frames: config.latency_frames,
            gain: config.gain.clamp(0.0, 1.0),
            ..Default::default()
        }
    }
}

impl EngineConfig {
    /// Calculate latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.latency_frames as f64 / self.sample_rate as f64 * 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CueKind {
    Beep { rep: u32, cents: f64 },
    Finale,
}

/// A ready-to-play mono buffer at the engine sample rate
#[derive(Debug, Clone)]
pub struct Cue {
    pub kind: CueKind,
    pub samples: Arc<[f32]>,
}

/// Messages from the control side to the renderer
#[derive(Debug)]
pub enum EngineCommand {
    Play(Arc<[f32]>),
    StopAll,
}

/// Plays cues. Implementations synchronize internally; callers hold no locks.
pub trait AudioEngine: Send {
    /// Start (or restart) output. No-op if already running.
    fn start(&mut self) -> Result<(), AudioError>;

    fn play(&mut self, cue: Cue) -> Result<(), AudioError>;

    /// Silence everything currently playing
    fn stop_all(&mut self);

    fn is_running(&self) -> bool;

    fn sample_rate(&self) -> u32;
}

struct Voice {
    samples: Arc<[f32]>,
    position: usize,
}

/// RT side of the engine: drains commands and mixes voices.
///
/// Owned by exactly one thread at a time (the backend's).
pub struct VoiceRenderer {
    commands: Consumer<EngineCommand>,
    voices: Vec<Voice>,
    channels: usize,
    gain: Arc<AtomicF32>,
}

impl VoiceRenderer {
    fn new(commands: Consumer<EngineCommand>, channels: usize, gain: Arc<AtomicF32>) -> Self {
        Self {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
            channels: channels.max(1),
            gain,
        }
    }

    /// Fill `out` (interleaved) with the mix of active voices.
    ///
    /// Returns true if any voice contributed.
    pub fn render(&mut self, out: &mut [f32]) -> bool {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::Play(samples) => {
                    if self.voices.len() < MAX_VOICES && !samples.is_empty() {
                        self.voices.push(Voice {
                            samples,
                            position: 0,
                        });
                    }
                }
                EngineCommand::StopAll => self.voices.clear(),
            }
        }

        out.fill(0.0);
        if self.voices.is_empty() {
            return false;
        }

        let gain = self.gain.load(Ordering::Relaxed);
        let channels = self.channels;
        let frames = out.len() / channels;

        for voice in &mut self.voices {
            let remaining = voice.samples.len() - voice.position;
            let n = remaining.min(frames);
            let src = &voice.samples[voice.position..voice.position + n];
            for (frame, &sample) in out.chunks_exact_mut(channels).zip(src) {
                for slot in frame {
                    *slot += sample * gain;
                }
            }
            voice.position += n;
        }

        self.voices.retain(|v| v.position < v.samples.len());
        true
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Where rendered audio goes. Runs the renderer on its own schedule.
pub trait OutputBackend: Send {
    fn start(&mut self, renderer: VoiceRenderer, config: &EngineConfig) -> Result<(), AudioError>;

    /// Stop output and drop the renderer. Idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Backend for builds or devices without audio output. Start always fails.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OutputBackend for UnavailableBackend {
    fn start(&mut self, _renderer: VoiceRenderer, _config: &EngineConfig) -> Result<(), AudioError> {
        Err(AudioError::NotAvailable(self.reason.clone()))
    }

    fn stop(&mut self) {}

    fn is_running(&self) -> bool {
        false
    }
}

/// Backend that renders only when pulled through its `OfflineTap`.
///
/// Used for tests and offline rendering.
#[derive(Default)]
pub struct OfflineBackend {
    slot: Arc<Mutex<Option<VoiceRenderer>>>,
}

/// Pull handle for an `OfflineBackend`
#[derive(Clone)]
pub struct OfflineTap {
    slot: Arc<Mutex<Option<VoiceRenderer>>>,
    channels: usize,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tap(&self, channels: u32) -> OfflineTap {
        OfflineTap {
            slot: Arc::clone(&self.slot),
            channels: channels.max(1) as usize,
        }
    }
}

impl OutputBackend for OfflineBackend {
    fn start(&mut self, renderer: VoiceRenderer, _config: &EngineConfig) -> Result<(), AudioError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| AudioError::Init("offline renderer poisoned".to_string()))?;
        *slot = Some(renderer);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }

    fn is_running(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl OfflineTap {
    /// Render `frames` frames. Silence if the backend is stopped.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(renderer) = slot.as_mut() {
                renderer.render(&mut out);
            }
        }
        out
    }

    pub fn active_voices(&self) -> usize {
        self.slot
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|r| r.active_voices()))
            .unwrap_or(0)
    }
}

/// The backend this build can offer for real output
pub fn default_backend() -> Box<dyn OutputBackend> {
    #[cfg(feature = "pipewire")]
    {
        Box::new(super::pipewire_output::PipeWireBackend::new())
    }
    #[cfg(not(feature = "pipewire"))]
    {
        Box::new(UnavailableBackend::new(
            "built without the pipewire feature",
        ))
    }
}

/// `AudioEngine` over an rtrb command ring and an `OutputBackend`
pub struct RingEngine {
    config: EngineConfig,
    backend: Box<dyn OutputBackend>,
    producer: Option<Producer<EngineCommand>>,
    gain: Arc<AtomicF32>,
}

impl RingEngine {
    pub fn new(config: EngineConfig, backend: Box<dyn OutputBackend>) -> Self {
        let gain = Arc::new(AtomicF32::new(config.gain));
        Self {
            config,
            backend,
            producer: None,
            gain,
        }
    }

    /// Change master gain (clamped to 0.0-1.0). Takes effect next callback.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.clamp(0.0, 1.0), Ordering::Relaxed);
    }

    /// Stop the backend and drop the ring
    pub fn shutdown(&mut self) {
        self.backend.stop();
        self.producer = None;
    }

    fn send(&mut self, command: EngineCommand) -> Result<(), AudioError> {
        let producer = self.producer.as_mut().ok_or(AudioError::NotRunning)?;
        producer.push(command).map_err(|_| AudioError::QueueFull)
    }
}

impl AudioEngine for RingEngine {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.is_running() {
            return Ok(());
        }

        // A stale renderer may still hold the old consumer
        self.backend.stop();
        self.producer = None;

        let (producer, consumer) = RingBuffer::new(self.config.queue_capacity.max(1));
        let renderer = VoiceRenderer::new(
            consumer,
            self.config.channels as usize,
            Arc::clone(&self.gain),
        );
        self.backend.start(renderer, &self.config)?;
        self.producer = Some(producer);

        info!(
            "audio engine started: {} @ {}Hz, {} channels ({:.1}ms)",
            self.config.name,
            self.config.sample_rate,
            self.config.channels,
            self.config.latency_ms()
        );
        Ok(())
    }

    fn play(&mut self, cue: Cue) -> Result<(), AudioError> {
        debug!("play {:?} ({} samples)", cue.kind, cue.samples.len());
        self.send(EngineCommand::Play(cue.samples))
    }

    fn stop_all(&mut self) {
        if let Err(e) = self.send(EngineCommand::StopAll) {
            debug!("stop_all not delivered: {}", e);
        }
    }

    fn is_running(&self) -> bool {
        self.producer.is_some() && self.backend.is_running()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

impl Drop for RingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_engine(channels: u32) -> (RingEngine, OfflineTap) {
        let backend = OfflineBackend::new();
        let tap = backend.tap(channels);
        let config = EngineConfig {
            channels,
            gain: 1.0,
            ..Default::default()
        };
        (RingEngine::new(config, Box::new(backend)), tap)
    }

    fn cue(samples: Vec<f32>) -> Cue {
        Cue {
            kind: CueKind::Finale,
            samples: samples.into(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.name, "visioncoach");
    }

    #[test]
    fn test_play_before_start_fails() {
        let (mut engine, _tap) = offline_engine(1);
        let err = engine.play(cue(vec![0.5; 4])).unwrap_err();
        assert!(matches!(err, AudioError::NotRunning));
    }

    #[test]
    fn test_renders_cue_into_all_channels() {
        let (mut engine, tap) = offline_engine(2);
        engine.start().unwrap();
        engine.play(cue(vec![0.25, 0.5, 0.75])).unwrap();

        let out = tap.pull(4);
        assert_eq!(out, vec![0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 0.0, 0.0]);
        assert_eq!(tap.active_voices(), 0);
    }

    #[test]
    fn test_voices_mix_and_span_callbacks() {
        let (mut engine, tap) = offline_engine(1);
        engine.start().unwrap();
        engine.play(cue(vec![0.1; 6])).unwrap();
        engine.play(cue(vec![0.2; 2])).unwrap();

        let first = tap.pull(4);
        assert!((first[0] - 0.3).abs() < 1e-6);
        assert!((first[2] - 0.1).abs() < 1e-6);
        assert_eq!(tap.active_voices(), 1);

        let second = tap.pull(4);
        assert!((second[1] - 0.1).abs() < 1e-6);
        assert_eq!(second[2], 0.0);
    }

    #[test]
    fn test_stop_all_silences() {
        let (mut engine, tap) = offline_engine(1);
        engine.start().unwrap();
        engine.play(cue(vec![0.5; 100])).unwrap();
        tap.pull(10);

        engine.stop_all();
        assert!(tap.pull(10).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_gain_applied() {
        let (mut engine, tap) = offline_engine(1);
        engine.start().unwrap();
        engine.set_gain(0.5);
        engine.play(cue(vec![1.0])).unwrap();
        assert_eq!(tap.pull(1), vec![0.5]);
    }

    #[test]
    fn test_queue_full() {
        let backend = OfflineBackend::new();
        let config = EngineConfig {
            queue_capacity: 2,
            ..Default::default()
        };
        let mut engine = RingEngine::new(config, Box::new(backend));
        engine.start().unwrap();
        engine.play(cue(vec![0.1])).unwrap();
        engine.play(cue(vec![0.1])).unwrap();
        assert!(matches!(engine.play(cue(vec![0.1])), Err(AudioError::QueueFull)));
    }

    #[test]
    fn test_unavailable_backend() {
        let mut engine = RingEngine::new(
            EngineConfig::default(),
            Box::new(UnavailableBackend::new("no device")),
        );
        assert!(matches!(engine.start(), Err(AudioError::NotAvailable(_))));
        assert!(!engine.is_running());
        assert!(matches!(engine.play(cue(vec![0.1])), Err(AudioError::NotRunning)));
    }

    #[test]
    fn test_restart_after_shutdown() {
        let (mut engine, tap) = offline_engine(1);
        engine.start().unwrap();
        engine.shutdown();
        assert!(!engine.is_running());

        engine.start().unwrap();
        engine.play(cue(vec![0.4])).unwrap();
        assert_eq!(tap.pull(1), vec![0.4]);
    }
}
