//! Rep-indexed feedback: a rising beep per rep, one finale per session

use tracing::{debug, info, warn};

use super::cues::CueBank;
use super::engine::{AudioEngine, Cue, CueKind};
use super::pitch::PitchShifter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerConfig {
    /// Rep index that triggers the finale
    pub finale_rep: u32,
    /// Pitch offset of the last beep before the finale
    pub max_pitch_cents: f64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            finale_rep: 70,
            max_pitch_cents: 1200.0,
        }
    }
}

impl From<&coachconf::CoachingConfig> for SequencerConfig {
    fn from(config: &coachconf::CoachingConfig) -> Self {
        Self {
            finale_rep: config.finale_rep,
            max_pitch_cents: config.max_pitch_cents,
        }
    }
}

/// Pitch offset for the beep of `rep`: linear from 0 at rep 1 to `max_cents`
/// at rep `finale - 1`.
pub fn beep_cents(rep: u32, finale_rep: u32, max_cents: f64) -> f64 {
    if finale_rep <= 2 || rep <= 1 {
        return 0.0;
    }
    let progress = (rep - 1) as f64 / (finale_rep - 2) as f64;
    max_cents * progress.min(1.0)
}

/// Maps counted reps to audio cues. Owned by the frame-processing flow.
pub struct FeedbackSequencer {
    config: SequencerConfig,
    engine: Box<dyn AudioEngine>,
    cues: CueBank,
    shifter: PitchShifter,
    finale_played: bool,
}

impl FeedbackSequencer {
    pub fn new(config: SequencerConfig, engine: Box<dyn AudioEngine>, cues: CueBank) -> Self {
        let shifter = PitchShifter::new(cues.sample_rate());
        if cues.sample_rate() != engine.sample_rate() {
            warn!(
                "cue bank at {}Hz but engine runs at {}Hz",
                cues.sample_rate(),
                engine.sample_rate()
            );
        }
        Self {
            config,
            engine,
            cues,
            shifter,
            finale_played: false,
        }
    }

    /// React to the session's rep count reaching `rep`
    pub fn handle_rep(&mut self, rep: u32) {
        if rep == 0 || self.finale_played {
            return;
        }

        if rep >= self.config.finale_rep {
            self.finale_played = true;
            self.engine.stop_all();
            info!("rep {} reached, playing finale", rep);
            self.play(Cue {
                kind: CueKind::Finale,
                samples: self.cues.finale(),
            });
            return;
        }

        let cents = beep_cents(rep, self.config.finale_rep, self.config.max_pitch_cents);
        let samples = self.shifter.process(&self.cues.beep(), cents);
        debug!("rep {} beep at {:+.0} cents", rep, cents);
        self.play(Cue {
            kind: CueKind::Beep { rep, cents },
            samples: samples.into(),
        });
    }

    /// New session: finale may play again, engine (re)started
    pub fn reset_session(&mut self) {
        self.finale_played = false;
        if let Err(e) = self.engine.start() {
            warn!("audio feedback disabled for this session: {}", e);
        }
    }

    /// Silence playback. Cues stay loaded.
    pub fn stop(&mut self) {
        self.engine.stop_all();
    }

    pub fn finale_played(&self) -> bool {
        self.finale_played
    }

    fn play(&mut self, cue: Cue) {
        let kind = cue.kind;
        if let Err(e) = self.engine.play(cue) {
            warn!("dropped {:?} cue: {}", kind, e);
        }
    }
}
