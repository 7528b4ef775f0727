//! Session controller: camera lifecycle, frame loop, snapshot publishing
//!
//! ```text
//!  start() ──► capability ──► authorization ──► start_capture ──► Ready
//!                 │                │                  │
//!                 ▼                ▼                  ▼
//!            Unavailable         Denied             Failed
//!
//!  camera ──► FrameSender ══► FrameReceiver ──► estimate ──► FramePipeline
//!                                                                 │
//!                            watch<CoachSnapshot> ◄── publish ◄───┤
//!                                                                 ▼
//!                                             QuestTracker + FeedbackSequencer
//! ```
//!
//! The frame-processing task owns the pipeline and sequencer while a session
//! runs and hands them back when it ends. Only that task writes rep state.

use std::num::NonZeroU32;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::FeedbackSequencer;
use crate::camera::{Authorization, CameraDevice, CameraState, CaptureConfig, CaptureHandle};
use crate::frame::{frame_channel, FrameReceiver};
use crate::hint::CoachingHint;
use crate::pipeline::{FramePipeline, PipelineConfig};
use crate::pose::PoseEstimator;
use crate::quest::{ChallengeId, QuestTracker};

/// What the UI renders. Replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachSnapshot {
    pub camera_state: CameraState,
    pub rep_count: u32,
    pub hint: CoachingHint,
    /// Set while a capture session is live
    pub session_id: Option<Uuid>,
}

impl Default for CoachSnapshot {
    fn default() -> Self {
        Self {
            camera_state: CameraState::Idle,
            rep_count: 0,
            hint: CoachingHint::KeepVisible,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub pipeline: PipelineConfig,
    pub challenge: ChallengeId,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            challenge: ChallengeId::new("pushups"),
        }
    }
}

impl From<&coachconf::CoachConfig> for SessionSettings {
    fn from(config: &coachconf::CoachConfig) -> Self {
        Self {
            pipeline: PipelineConfig::from(&config.coaching),
            challenge: ChallengeId::new(config.coaching.challenge_id.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session start cancelled by teardown")]
    Cancelled,

    #[error("frame processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("session state was lost by an earlier task failure")]
    Poisoned,
}

/// Everything the frame loop mutates
struct SessionParts {
    pipeline: FramePipeline,
    sequencer: FeedbackSequencer,
}

struct RunningSession {
    id: Uuid,
    capture: Box<dyn CaptureHandle>,
    cancel: CancellationToken,
    task: JoinHandle<SessionParts>,
}

/// Read-only handles the frame loop needs
struct FrameContext {
    estimator: Arc<dyn PoseEstimator>,
    quest: Arc<dyn QuestTracker>,
    challenge: ChallengeId,
    snapshots: Arc<watch::Sender<CoachSnapshot>>,
}

pub struct SessionController {
    camera: Arc<dyn CameraDevice>,
    estimator: Arc<dyn PoseEstimator>,
    quest: Arc<dyn QuestTracker>,
    settings: SessionSettings,
    snapshots: Arc<watch::Sender<CoachSnapshot>>,
    teardown: CancellationToken,
    idle: Option<SessionParts>,
    running: Option<RunningSession>,
}

impl SessionController {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        estimator: Arc<dyn PoseEstimator>,
        quest: Arc<dyn QuestTracker>,
        sequencer: FeedbackSequencer,
        settings: SessionSettings,
    ) -> Self {
        let (snapshots, _) = watch::channel(CoachSnapshot::default());
        Self {
            camera,
            estimator,
            quest,
            idle: Some(SessionParts {
                pipeline: FramePipeline::new(settings.pipeline),
                sequencer,
            }),
            settings,
            snapshots: Arc::new(snapshots),
            teardown: CancellationToken::new(),
            running: None,
        }
    }

    /// Cancelling this token aborts a pending permission prompt and any
    /// running frame loop.
    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoachSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshots(&self) -> WatchStream<CoachSnapshot> {
        WatchStream::new(self.subscribe())
    }

    pub fn snapshot(&self) -> CoachSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn camera_state(&self) -> CameraState {
        self.snapshots.borrow().camera_state
    }

    pub fn rep_count(&self) -> u32 {
        self.snapshots.borrow().rep_count
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bring the camera up and start counting.
    ///
    /// Returns the resulting camera state. Capability and permission problems
    /// are states, not errors.
    pub async fn start(&mut self) -> Result<CameraState, SessionError> {
        if self.running.is_some() {
            debug!("start ignored, session already running");
            return Ok(self.camera_state());
        }

        let facings = self.camera.facings();
        let capture_config = match CaptureConfig::for_facings(&facings) {
            Some(config) if self.estimator.is_supported() => config,
            _ => {
                info!("camera or pose estimation unavailable on this device");
                return Ok(self.publish_state(CameraState::Unavailable));
            }
        };

        match self.camera.authorization() {
            Authorization::Authorized => {}
            Authorization::NotDetermined => {
                self.publish_state(CameraState::RequestingPermission);
                let granted = tokio::select! {
                    granted = self.camera.request_access() => granted,
                    _ = self.teardown.cancelled() => {
                        self.publish_state(CameraState::Idle);
                        return Err(SessionError::Cancelled);
                    }
                };
                if !granted {
                    info!("camera access refused");
                    return Ok(self.publish_state(CameraState::Denied));
                }
            }
            status => {
                info!("camera access not authorized: {:?}", status);
                return Ok(self.publish_state(CameraState::Denied));
            }
        }

        let Some(mut parts) = self.idle.take() else {
            return Err(SessionError::Poisoned);
        };

        let (sender, receiver) = frame_channel();
        let mut capture = match self.camera.start_capture(&capture_config, sender) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("failed to configure capture: {}", e);
                self.idle = Some(parts);
                return Ok(self.publish_state(CameraState::Failed));
            }
        };

        parts.pipeline.reset();
        // Engine start may connect to an output server
        let parts = match tokio::task::spawn_blocking(move || {
            parts.sequencer.reset_session();
            parts
        })
        .await
        {
            Ok(parts) => parts,
            Err(e) => {
                capture.stop();
                self.publish_state(CameraState::Idle);
                return Err(SessionError::Task(e));
            }
        };
        self.quest.start_tracking(&self.settings.challenge);

        let id = Uuid::new_v4();
        // Published before the frame task exists so its first outcome wins
        self.snapshots.send_replace(CoachSnapshot {
            camera_state: CameraState::Ready,
            rep_count: 0,
            hint: CoachingHint::KeepVisible,
            session_id: Some(id),
        });

        let cancel = self.teardown.child_token();
        let context = FrameContext {
            estimator: Arc::clone(&self.estimator),
            quest: Arc::clone(&self.quest),
            challenge: self.settings.challenge.clone(),
            snapshots: Arc::clone(&self.snapshots),
        };
        let task = tokio::spawn(process_frames(receiver, context, parts, cancel.clone()));

        info!(
            "session {} started: {:?} camera, mirrored={}, challenge {}",
            id, capture_config.facing, capture_config.mirrored, self.settings.challenge
        );

        self.running = Some(RunningSession {
            id,
            capture,
            cancel,
            task,
        });
        Ok(CameraState::Ready)
    }

    /// Stop capture and audio. The rep count stays readable until the next
    /// `start()`.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        running.capture.stop();
        running.cancel.cancel();
        let result = (&mut running.task).await;
        self.finish(running, result)
    }

    /// Wait for the capture stream to end on its own, then clean up like
    /// `stop()`. Returns the final rep count.
    pub async fn join(&mut self) -> Result<u32, SessionError> {
        let Some(mut running) = self.running.take() else {
            return Ok(self.rep_count());
        };

        let result = (&mut running.task).await;
        running.capture.stop();
        self.finish(running, result)?;
        Ok(self.rep_count())
    }

    /// Cancel everything, including a pending permission prompt elsewhere
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.teardown.cancel();
        self.stop().await
    }

    fn finish(
        &mut self,
        running: RunningSession,
        result: Result<SessionParts, tokio::task::JoinError>,
    ) -> Result<(), SessionError> {
        self.snapshots.send_modify(|s| {
            s.camera_state = CameraState::Idle;
            s.session_id = None;
        });

        let mut parts = result?;
        parts.sequencer.stop();
        info!(
            "session {} stopped with {} reps",
            running.id,
            parts.pipeline.total_reps()
        );
        self.idle = Some(parts);
        Ok(())
    }

    fn publish_state(&self, state: CameraState) -> CameraState {
        self.snapshots.send_modify(|s| {
            s.camera_state = state;
            s.session_id = None;
        });
        state
    }
}

async fn process_frames(
    mut frames: FrameReceiver,
    context: FrameContext,
    mut parts: SessionParts,
    cancel: CancellationToken,
) -> SessionParts {
    let mut announced = 0u32;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = context.estimator.estimate(&frame) => result,
        };

        let outcome = parts.pipeline.ingest(result, frame.timestamp);

        if outcome.increment > 0 {
            for _ in 0..outcome.increment {
                context
                    .quest
                    .add_manual_progress(NonZeroU32::MIN, &context.challenge);
            }
            for rep in announced + 1..=outcome.total_reps {
                parts.sequencer.handle_rep(rep);
            }
            announced = outcome.total_reps;
            debug!("rep {} at {:.3}s", outcome.total_reps, frame.timestamp);
        }

        context.snapshots.send_if_modified(|s| {
            if s.rep_count == outcome.total_reps && s.hint == outcome.hint {
                return false;
            }
            s.rep_count = outcome.total_reps;
            s.hint = outcome.hint;
            true
        });
    }

    debug!(
        "frame loop finished: {} frames processed, {} dropped",
        frames.received(),
        frames.dropped()
    );
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let snapshot = CoachSnapshot::default();
        assert_eq!(snapshot.camera_state, CameraState::Idle);
        assert_eq!(snapshot.rep_count, 0);
        assert_eq!(snapshot.hint, CoachingHint::KeepVisible);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = CoachSnapshot {
            camera_state: CameraState::Ready,
            rep_count: 3,
            hint: CoachingHint::PressUp,
            session_id: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["camera_state"], "ready");
        assert_eq!(json["rep_count"], 3);
        assert_eq!(json["hint"], "press_up");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = coachconf::CoachConfig::default();
        config.coaching.challenge_id = "daily-70".to_string();
        config.coaching.rep.down_threshold = 90.0;

        let settings = SessionSettings::from(&config);
        assert_eq!(settings.challenge.as_str(), "daily-70");
        assert_eq!(settings.pipeline.thresholds.down, 90.0);
        assert_eq!(settings.pipeline.smoothing_window, 6);
    }
}
