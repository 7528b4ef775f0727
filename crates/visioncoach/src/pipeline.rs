//! Per-frame pipeline: pose result → arm → angle → smoothing → rep counter
//!
//! Every failure here is per-frame and advisory. It only changes the hint;
//! rep state is untouched and the next frame is processed normally.

use tracing::trace;

use crate::hint::CoachingHint;
use crate::pose::{select_arm, PoseError, PoseObservation, Side, DEFAULT_MIN_JOINT_CONFIDENCE};
use crate::rep_counter::{RepCounter, RepPhase, RepThresholds};
use crate::smoothing::{AngleSmoother, DEFAULT_WINDOW};

/// Tuning for one pipeline instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub thresholds: RepThresholds,
    pub smoothing_window: usize,
    pub min_joint_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: RepThresholds::default(),
            smoothing_window: DEFAULT_WINDOW,
            min_joint_confidence: DEFAULT_MIN_JOINT_CONFIDENCE,
        }
    }
}

impl From<&coachconf::CoachingConfig> for PipelineConfig {
    fn from(config: &coachconf::CoachingConfig) -> Self {
        Self {
            thresholds: RepThresholds::from(&config.rep),
            smoothing_window: config.smoothing_window,
            min_joint_confidence: config.min_joint_confidence,
        }
    }
}

/// Measured angles for a frame where an arm was tracked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmReading {
    pub side: Side,
    pub raw_angle: f64,
    pub smoothed_angle: f64,
}

/// What one frame did to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub hint: CoachingHint,
    /// 0 or 1
    pub increment: u32,
    pub total_reps: u32,
    pub phase: RepPhase,
    /// `None` when no arm was usable this frame
    pub reading: Option<ArmReading>,
}

/// Smoother + rep counter for one session
#[derive(Debug, Clone)]
pub struct FramePipeline {
    config: PipelineConfig,
    smoother: AngleSmoother,
    counter: RepCounter,
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            smoother: AngleSmoother::new(config.smoothing_window),
            counter: RepCounter::new(config.thresholds),
        }
    }

    /// Feed the pose estimator's answer for the frame at `timestamp`
    pub fn ingest(
        &mut self,
        pose: Result<Option<PoseObservation>, PoseError>,
        timestamp: f64,
    ) -> FrameOutcome {
        let pose = match pose {
            Ok(Some(pose)) => pose,
            Ok(None) => return self.advisory(CoachingHint::NoBody),
            Err(e) => {
                trace!("pose estimation failed at {:.3}s: {}", timestamp, e);
                return self.advisory(CoachingHint::VisionFailed);
            }
        };

        let Some(arm) = select_arm(&pose, self.config.min_joint_confidence) else {
            return self.advisory(CoachingHint::ShowJoints);
        };

        let raw_angle = arm.elbow_angle();
        let smoothed_angle = self.smoother.push(raw_angle);
        let update = self.counter.process(smoothed_angle, timestamp);

        trace!(
            "t={:.3}s side={:?} raw={:.1} smoothed={:.1} phase={:?} reps={}",
            timestamp,
            arm.side,
            raw_angle,
            smoothed_angle,
            update.phase,
            update.total_reps
        );

        FrameOutcome {
            hint: update.hint,
            increment: update.increment,
            total_reps: update.total_reps,
            phase: update.phase,
            reading: Some(ArmReading {
                side: arm.side,
                raw_angle,
                smoothed_angle,
            }),
        }
    }

    fn advisory(&self, hint: CoachingHint) -> FrameOutcome {
        FrameOutcome {
            hint,
            increment: 0,
            total_reps: self.counter.total_reps(),
            phase: self.counter.phase(),
            reading: None,
        }
    }

    /// Fresh smoother and counter, same tuning
    pub fn reset(&mut self) {
        self.smoother = AngleSmoother::new(self.config.smoothing_window);
        self.counter.reset();
    }

    pub fn total_reps(&self) -> u32 {
        self.counter.total_reps()
    }

    pub fn phase(&self) -> RepPhase {
        self.counter.phase()
    }
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
