//! Coaching configuration - tuning for the rep counter and audio feedback.
//!
//! Every default here is a tuning constant for push-ups on a phone camera.
//! Other exercises or devices are expected to override them.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Hysteresis thresholds for the rep phase state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepConfig {
    /// Elbow angle (degrees) at or below which the arm counts as "down".
    #[serde(default = "RepConfig::default_down_threshold")]
    pub down_threshold: f64,

    /// Elbow angle (degrees) at or above which the arm counts as "up".
    #[serde(default = "RepConfig::default_up_threshold")]
    pub up_threshold: f64,

    /// Minimum seconds between two counted reps.
    #[serde(default = "RepConfig::default_cooldown_secs")]
    pub cooldown_secs: f64,
}

impl RepConfig {
    fn default_down_threshold() -> f64 {
        95.0
    }

    fn default_up_threshold() -> f64 {
        155.0
    }

    fn default_cooldown_secs() -> f64 {
        0.45
    }
}

impl Default for RepConfig {
    fn default() -> Self {
        Self {
            down_threshold: Self::default_down_threshold(),
            up_threshold: Self::default_up_threshold(),
            cooldown_secs: Self::default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingConfig {
    /// Number of angle samples in the moving average.
    #[serde(default = "CoachingConfig::default_smoothing_window")]
    pub smoothing_window: usize,

    /// Per-joint confidence a side needs to exceed to be tracked.
    #[serde(default = "CoachingConfig::default_min_joint_confidence")]
    pub min_joint_confidence: f64,

    /// Rep index that plays the finale cue instead of a beep.
    #[serde(default = "CoachingConfig::default_finale_rep")]
    pub finale_rep: u32,

    /// Pitch of the last regular beep, in cents above the base beep.
    #[serde(default = "CoachingConfig::default_max_pitch_cents")]
    pub max_pitch_cents: f64,

    /// Quest challenge that receives progress for every counted rep.
    #[serde(default = "CoachingConfig::default_challenge_id")]
    pub challenge_id: String,

    #[serde(default)]
    pub rep: RepConfig,
}

impl CoachingConfig {
    fn default_smoothing_window() -> usize {
        6
    }

    fn default_min_joint_confidence() -> f64 {
        0.25
    }

    fn default_finale_rep() -> u32 {
        70
    }

    fn default_max_pitch_cents() -> f64 {
        1200.0
    }

    fn default_challenge_id() -> String {
        "pushups".to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smoothing_window == 0 {
            return Err(ConfigError::Invalid(
                "coaching.smoothing_window must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_joint_confidence) {
            return Err(ConfigError::Invalid(format!(
                "coaching.min_joint_confidence must be within [0, 1], got {}",
                self.min_joint_confidence
            )));
        }
        if self.finale_rep < 2 {
            return Err(ConfigError::Invalid(format!(
                "coaching.finale_rep must be at least 2, got {}",
                self.finale_rep
            )));
        }
        if self.rep.down_threshold >= self.rep.up_threshold {
            return Err(ConfigError::Invalid(format!(
                "coaching.rep.down_threshold ({}) must be below up_threshold ({})",
                self.rep.down_threshold, self.rep.up_threshold
            )));
        }
        if !(self.rep.cooldown_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "coaching.rep.cooldown_secs must be non-negative, got {}",
                self.rep.cooldown_secs
            )));
        }
        if self.challenge_id.trim().is_empty() {
            return Err(ConfigError::Invalid("coaching.challenge_id is empty".into()));
        }
        Ok(())
    }
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            smoothing_window: Self::default_smoothing_window(),
            min_joint_confidence: Self::default_min_joint_confidence(),
            finale_rep: Self::default_finale_rep(),
            max_pitch_cents: Self::default_max_pitch_cents(),
            challenge_id: Self::default_challenge_id(),
            rep: RepConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(CoachingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = CoachingConfig {
            smoothing_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_cooldown_rejected() {
        let mut config = CoachingConfig::default();
        config.rep.cooldown_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let config = CoachingConfig {
            min_joint_confidence: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
