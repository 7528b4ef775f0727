//! Coaching hints shown under the live preview
//!
//! Hints are stateless: every processed frame recomputes one. The UI maps the
//! key to localized copy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier from the fixed hint catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingHint {
    /// In the up phase, waiting for the user to go down
    LowerControl,
    /// In the down phase, waiting for the user to press back up
    PressUp,
    /// A rep was just counted
    RepCounted,
    /// First angle of the session - phase just established
    FullRange,
    /// Just crossed the down threshold
    GreatDepth,
    /// Pose estimator saw no person
    NoBody,
    /// Person found but neither arm is tracked confidently
    ShowJoints,
    /// Pose estimation call failed
    VisionFailed,
    /// Session is live, no frame processed yet
    KeepVisible,
}

impl CoachingHint {
    pub const ALL: [CoachingHint; 9] = [
        CoachingHint::LowerControl,
        CoachingHint::PressUp,
        CoachingHint::RepCounted,
        CoachingHint::FullRange,
        CoachingHint::GreatDepth,
        CoachingHint::NoBody,
        CoachingHint::ShowJoints,
        CoachingHint::VisionFailed,
        CoachingHint::KeepVisible,
    ];

    /// Stable key used by the UI string table
    pub fn key(self) -> &'static str {
        match self {
            CoachingHint::LowerControl => "lower_control",
            CoachingHint::PressUp => "press_up",
            CoachingHint::RepCounted => "rep_counted",
            CoachingHint::FullRange => "full_range",
            CoachingHint::GreatDepth => "great_depth",
            CoachingHint::NoBody => "no_body",
            CoachingHint::ShowJoints => "show_joints",
            CoachingHint::VisionFailed => "vision_failed",
            CoachingHint::KeepVisible => "keep_visible",
        }
    }

    /// True for hints caused by a tracking problem rather than rep progress
    pub fn is_tracking_issue(self) -> bool {
        matches!(
            self,
            CoachingHint::NoBody | CoachingHint::ShowJoints | CoachingHint::VisionFailed
        )
    }
}

impl fmt::Display for CoachingHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_key() {
        for hint in CoachingHint::ALL {
            let json = serde_json::to_string(&hint).unwrap();
            assert_eq!(json, format!("\"{}\"", hint.key()));
            let back: CoachingHint = serde_json::from_str(&json).unwrap();
            assert_eq!(back, hint);
        }
    }

    #[test]
    fn test_tracking_issues() {
        assert!(CoachingHint::NoBody.is_tracking_issue());
        assert!(CoachingHint::VisionFailed.is_tracking_issue());
        assert!(!CoachingHint::RepCounted.is_tracking_issue());
    }
}
