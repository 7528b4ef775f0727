//! Vision Coach: camera-driven push-up counter
//!
//! Frames from a camera are run through a pose estimator, the better-tracked
//! arm's elbow angle is smoothed, and a hysteresis state machine counts reps.
//! Every counted rep is forwarded to a quest tracker and answered with a
//! rising beep; the session's final rep gets a one-shot finale.
//!
//! - **Session** (`session`): camera lifecycle, frame loop, snapshot stream
//! - **Pipeline** (`pipeline`, `pose`, `smoothing`, `rep_counter`): per-frame math
//! - **Audio** (`audio`): cue bank, pitch shift, lock-free playback engine
//! - **Replay** (`replay`): recorded traces standing in for camera and model
//!
//! The camera, pose model and quest tracker are external capabilities reached
//! through the `CameraDevice`, `PoseEstimator` and `QuestTracker` traits.

pub mod audio;
pub mod camera;
pub mod frame;
pub mod hint;
pub mod pipeline;
pub mod pose;
pub mod quest;
pub mod rep_counter;
pub mod replay;
pub mod session;
pub mod smoothing;

pub use audio::{
    AudioEngine, AudioError, CueBank, EngineConfig, FeedbackSequencer, RingEngine,
    SequencerConfig,
};
pub use camera::{
    Authorization, CameraDevice, CameraError, CameraState, CaptureConfig, CaptureHandle,
};
pub use frame::{frame_channel, Facing, FrameReceiver, FrameSample, FrameSender, ImageBuffer};
pub use hint::CoachingHint;
pub use pipeline::{ArmReading, FrameOutcome, FramePipeline, PipelineConfig};
pub use pose::{
    elbow_angle, select_arm, ArmJoints, JointKind, JointName, JointObservation, Point2,
    PoseError, PoseEstimator, PoseObservation, Side,
};
pub use quest::{ChallengeId, MemoryQuestTracker, QuestEvent, QuestTracker};
pub use rep_counter::{RepCounter, RepPhase, RepThresholds, RepUpdate};
pub use replay::{Pacing, ReplayCamera, ReplayEstimator, Trace, TraceError, TraceRecord};
pub use session::{CoachSnapshot, SessionController, SessionError, SessionSettings};
pub use smoothing::AngleSmoother;
