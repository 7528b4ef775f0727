//! Rep phase state machine
//!
//! Turns a smoothed elbow angle plus a monotonic timestamp into rep increments.
//! Two thresholds give hysteresis: the arm has to drop to `down` before it can
//! count, then come back to `up`. A cooldown after every counted rep rejects
//! spurious re-triggers from tracking jitter.
//!
//! ```text
//!             angle <  down               angle <= down
//!  Unknown ─────────────────► Down ◄──────────────────── Up
//!     │                        │                          ▲
//!     │ angle >= down          │ angle >= up && cooldown  │
//!     └────────────────────────┼──────────────────────────┘
//!                              └──────── +1 rep ──────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::hint::CoachingHint;

/// Arm phase as seen by the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepPhase {
    #[default]
    Unknown,
    Up,
    Down,
}

/// Hysteresis thresholds (degrees) and cooldown (seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepThresholds {
    pub down: f64,
    pub up: f64,
    pub cooldown: f64,
}

impl Default for RepThresholds {
    fn default() -> Self {
        Self {
            down: 95.0,
            up: 155.0,
            cooldown: 0.45,
        }
    }
}

impl From<&coachconf::RepConfig> for RepThresholds {
    fn from(config: &coachconf::RepConfig) -> Self {
        Self {
            down: config.down_threshold,
            up: config.up_threshold,
            cooldown: config.cooldown_secs,
        }
    }
}

/// Result of feeding one angle into the counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepUpdate {
    /// 0 or 1
    pub increment: u32,
    pub hint: CoachingHint,
    pub phase: RepPhase,
    pub total_reps: u32,
}

/// Owns `RepCounterState`. Single writer: only the frame-processing flow
/// calls `process`.
#[derive(Debug, Clone)]
pub struct RepCounter {
    thresholds: RepThresholds,
    phase: RepPhase,
    total_reps: u32,
    last_rep_at: f64,
}

impl RepCounter {
    pub fn new(thresholds: RepThresholds) -> Self {
        Self {
            thresholds,
            phase: RepPhase::Unknown,
            total_reps: 0,
            last_rep_at: f64::NEG_INFINITY,
        }
    }

    /// Advance the state machine with one smoothed angle.
    ///
    /// Never panics. A NaN angle fails every comparison, so the phase simply
    /// stays where it is (or becomes `Up` from `Unknown`).
    pub fn process(&mut self, angle: f64, timestamp: f64) -> RepUpdate {
        let t = self.thresholds;
        let mut increment = 0;

        let hint = match self.phase {
            RepPhase::Unknown => {
                self.phase = if angle < t.down {
                    RepPhase::Down
                } else {
                    RepPhase::Up
                };
                CoachingHint::FullRange
            }
            RepPhase::Up => {
                if angle <= t.down {
                    self.phase = RepPhase::Down;
                    CoachingHint::GreatDepth
                } else {
                    CoachingHint::LowerControl
                }
            }
            RepPhase::Down => {
                if angle >= t.up && timestamp - self.last_rep_at >= t.cooldown {
                    self.phase = RepPhase::Up;
                    self.total_reps += 1;
                    self.last_rep_at = timestamp;
                    increment = 1;
                    CoachingHint::RepCounted
                } else {
                    CoachingHint::PressUp
                }
            }
        };

        RepUpdate {
            increment,
            hint,
            phase: self.phase,
            total_reps: self.total_reps,
        }
    }

    /// Back to the initial state (new session)
    pub fn reset(&mut self) {
        self.phase = RepPhase::Unknown;
        self.total_reps = 0;
        self.last_rep_at = f64::NEG_INFINITY;
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn total_reps(&self) -> u32 {
        self.total_reps
    }

    /// Timestamp of the last counted rep, `-inf` before the first one
    pub fn last_rep_at(&self) -> f64 {
        self.last_rep_at
    }

    pub fn thresholds(&self) -> RepThresholds {
        self.thresholds
    }
}

impl Default for RepCounter {
    fn default() -> Self {
        Self::new(RepThresholds::default())
    }
}
