//! Recorded sessions: trace files, a replaying estimator and camera
//!
//! A trace is JSON lines, one record per camera frame:
//!
//! ```text
//! {"t": 0.000, "pose": {"joints": [{"joint": "left_elbow", "x": 0.5, "y": 0.5, "confidence": 0.9}, ...]}}
//! {"t": 0.033, "pose": null}
//! {"t": 0.066, "error": "request timed out"}
//! ```
//!
//! `ReplayCamera` turns records into frames; `ReplayEstimator` answers each
//! frame with the recorded pose for its timestamp. Together they drive a
//! `SessionController` without a camera or a pose model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::camera::{
    Authorization, CameraDevice, CameraError, CaptureConfig, CaptureHandle,
};
use crate::frame::{Facing, FrameSample, FrameSender, ImageBuffer};
use crate::pose::{PoseError, PoseEstimator, PoseObservation};

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("line {line}: timestamp {t} is not after the previous record")]
    Timestamp { line: usize, t: f64 },

    #[error("trace has no records")]
    Empty,
}

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Frame timestamp, seconds
    pub t: f64,
    #[serde(default)]
    pub pose: Option<PoseObservation>,
    /// Estimator failure for this frame; wins over `pose`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceRecord {
    pub fn pose(t: f64, pose: PoseObservation) -> Self {
        Self {
            t,
            pose: Some(pose),
            error: None,
        }
    }

    pub fn no_body(t: f64) -> Self {
        Self {
            t,
            pose: None,
            error: None,
        }
    }

    pub fn failure(t: f64, message: impl Into<String>) -> Self {
        Self {
            t,
            pose: None,
            error: Some(message.into()),
        }
    }

    /// What the estimator should answer for this frame
    pub fn answer(&self) -> Result<Option<PoseObservation>, PoseError> {
        match &self.error {
            Some(message) => Err(PoseError::Request(message.clone())),
            None => Ok(self.pose.clone()),
        }
    }
}

/// Ordered records with strictly increasing timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    pub fn new(records: Vec<TraceRecord>) -> Result<Self, TraceError> {
        let lines: Vec<usize> = (1..=records.len()).collect();
        Self::checked(records, &lines)
    }

    /// Parse JSON lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, TraceError> {
        let mut records = Vec::new();
        let mut lines = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: TraceRecord = serde_json::from_str(line)
                .map_err(|source| TraceError::Parse { line: i + 1, source })?;
            records.push(record);
            lines.push(i + 1);
        }

        Self::checked(records, &lines)
    }

    /// `lines[i]` is the source line of `records[i]`, used in errors
    fn checked(records: Vec<TraceRecord>, lines: &[usize]) -> Result<Self, TraceError> {
        if records.is_empty() {
            return Err(TraceError::Empty);
        }
        let mut last = f64::NEG_INFINITY;
        for (record, &line) in records.iter().zip(lines) {
            if !record.t.is_finite() || record.t <= last {
                return Err(TraceError::Timestamp { line, t: record.t });
            }
            last = record.t;
        }
        Ok(Self { records })
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trace = Self::parse(&text)?;
        info!(
            "loaded trace {} ({} frames, {:.1}s)",
            path.display(),
            trace.len(),
            trace.duration()
        );
        Ok(trace)
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seconds from first to last record
    pub fn duration(&self) -> f64 {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => last.t - first.t,
            _ => 0.0,
        }
    }
}

/// Answers pose requests from a trace, keyed by frame timestamp
pub struct ReplayEstimator {
    answers: HashMap<u64, TraceRecord>,
}

impl ReplayEstimator {
    pub fn new(trace: &Trace) -> Self {
        let answers = trace
            .records()
            .iter()
            .map(|r| (r.t.to_bits(), r.clone()))
            .collect();
        Self { answers }
    }
}

#[async_trait]
impl PoseEstimator for ReplayEstimator {
    async fn estimate(&self, frame: &FrameSample) -> Result<Option<PoseObservation>, PoseError> {
        match self.answers.get(&frame.timestamp.to_bits()) {
            Some(record) => record.answer(),
            None => Err(PoseError::InvalidFrame(format!(
                "no recorded pose at t={:.3}",
                frame.timestamp
            ))),
        }
    }
}

/// How a `ReplayCamera` paces its frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Sleep until each record's timestamp, like a live camera
    RealTime,
    /// Send the next frame only after the previous one was processed
    #[default]
    Lockstep,
}

/// Camera that plays back a trace. Device traits are configurable for tests.
pub struct ReplayCamera {
    trace: Arc<Trace>,
    pacing: Pacing,
    facings: Vec<Facing>,
    authorization: Authorization,
    /// `None` leaves the permission prompt unanswered forever
    access_response: Option<bool>,
    capture_failure: Option<String>,
}

impl ReplayCamera {
    pub fn new(trace: Trace, pacing: Pacing) -> Self {
        Self {
            trace: Arc::new(trace),
            pacing,
            facings: vec![Facing::Front],
            authorization: Authorization::Authorized,
            access_response: Some(true),
            capture_failure: None,
        }
    }

    pub fn with_facings(mut self, facings: Vec<Facing>) -> Self {
        self.facings = facings;
        self
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_access_response(mut self, response: Option<bool>) -> Self {
        self.access_response = response;
        self
    }

    /// Make `start_capture` fail with an output error
    pub fn with_capture_failure(mut self, message: impl Into<String>) -> Self {
        self.capture_failure = Some(message.into());
        self
    }
}

#[async_trait]
impl CameraDevice for ReplayCamera {
    fn facings(&self) -> Vec<Facing> {
        self.facings.clone()
    }

    fn authorization(&self) -> Authorization {
        self.authorization
    }

    async fn request_access(&self) -> bool {
        match self.access_response {
            Some(granted) => granted,
            None => std::future::pending().await,
        }
    }

    fn start_capture(
        &self,
        config: &CaptureConfig,
        frames: FrameSender,
    ) -> Result<Box<dyn CaptureHandle>, CameraError> {
        if !self.facings.contains(&config.facing) {
            return Err(CameraError::NoDevice(config.facing));
        }
        if let Some(message) = &self.capture_failure {
            return Err(CameraError::Output(message.clone()));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(play_trace(
            Arc::clone(&self.trace),
            self.pacing,
            config.facing,
            frames,
            cancel.clone(),
        ));
        Ok(Box::new(ReplayCapture { cancel, task }))
    }
}

struct ReplayCapture {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CaptureHandle for ReplayCapture {
    fn stop(&mut self) {
        self.cancel.cancel();
    }

    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ReplayCapture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn play_trace(
    trace: Arc<Trace>,
    pacing: Pacing,
    facing: Facing,
    mut frames: FrameSender,
    cancel: CancellationToken,
) {
    let start = Instant::now();
    let t0 = trace.records().first().map(|r| r.t).unwrap_or(0.0);

    for record in trace.records() {
        if pacing == Pacing::RealTime {
            let at = start + Duration::from_secs_f64((record.t - t0).max(0.0));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(at) => {}
            }
        } else if cancel.is_cancelled() {
            break;
        }

        let frame = FrameSample::new(ImageBuffer::empty(), record.t, facing);
        if !frames.send(frame) {
            break;
        }

        if pacing == Pacing::Lockstep {
            let consumed = tokio::select! {
                _ = cancel.cancelled() => false,
                consumed = frames.until_consumed() => consumed,
            };
            if !consumed {
                break;
            }
        }
    }

    debug!("replay finished after {} frames", frames.sent());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_channel;
    use crate::pose::{JointName, JointObservation};

    const TRACE: &str = r#"
# two frames and a failure
{"t": 0.0, "pose": {"joints": [{"joint": "left_elbow", "x": 0.5, "y": 0.5, "confidence": 0.9}]}}
{"t": 0.1, "pose": null}

{"t": 0.2, "error": "model busy"}
"#;

    #[test]
    fn test_parse_trace() {
        let trace = Trace::parse(TRACE).unwrap();
        assert_eq!(trace.len(), 3);
        assert!((trace.duration() - 0.2).abs() < 1e-12);

        let first = trace.records()[0].answer().unwrap().unwrap();
        assert_eq!(first.joints[0].position.x, 0.5);
        assert!(trace.records()[1].answer().unwrap().is_none());
        assert!(matches!(
            trace.records()[2].answer(),
            Err(PoseError::Request(m)) if m == "model busy"
        ));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = Trace::parse("{\"t\": 0.0}\nnot json\n").unwrap_err();
        assert!(matches!(err, TraceError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_timestamps_must_increase() {
        let err = Trace::parse("{\"t\": 0.5}\n{\"t\": 0.5}\n").unwrap_err();
        assert!(matches!(err, TraceError::Timestamp { line: 2, .. }));
        assert!(matches!(Trace::parse("\n# nothing\n"), Err(TraceError::Empty)));
    }

    #[test]
    fn test_ordering_errors_name_source_line() {
        let text = "# warmup\n{\"t\": 0.0}\n\n{\"t\": 0.1}\n{\"t\": 0.05}\n";
        let err = Trace::parse(text).unwrap_err();
        assert!(matches!(err, TraceError::Timestamp { line: 5, .. }));

        let records = vec![TraceRecord::no_body(0.0), TraceRecord::no_body(f64::NAN)];
        let err = Trace::new(records).unwrap_err();
        assert!(matches!(err, TraceError::Timestamp { line: 2, .. }));
        assert!(matches!(Trace::new(Vec::new()), Err(TraceError::Empty)));
    }

    #[test]
    fn test_jsonl_roundtrip() {
        let trace = Trace::new(vec![
            TraceRecord::pose(
                0.0,
                PoseObservation::new(vec![JointObservation::new(
                    JointName::RightWrist,
                    0.5,
                    0.25,
                    0.75,
                )]),
            ),
            TraceRecord::no_body(0.5),
            TraceRecord::failure(1.0, "lost"),
        ])
        .unwrap();
        let text = trace.to_jsonl().unwrap();
        assert_eq!(Trace::parse(&text).unwrap(), trace);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        std::fs::write(&path, TRACE).unwrap();
        assert_eq!(Trace::load(&path).unwrap().len(), 3);
        assert!(matches!(
            Trace::load(&dir.path().join("missing.jsonl")),
            Err(TraceError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_estimator_answers_by_timestamp() {
        let trace = Trace::parse(TRACE).unwrap();
        let estimator = ReplayEstimator::new(&trace);

        let frame = |t| FrameSample::new(ImageBuffer::empty(), t, Facing::Front);
        assert!(estimator.estimate(&frame(0.0)).await.unwrap().is_some());
        assert!(estimator.estimate(&frame(0.1)).await.unwrap().is_none());
        assert!(estimator.estimate(&frame(0.2)).await.is_err());
        assert!(matches!(
            estimator.estimate(&frame(0.3)).await,
            Err(PoseError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_lockstep_camera_delivers_every_frame() {
        let trace = Trace::parse(TRACE).unwrap();
        let camera = ReplayCamera::new(trace, Pacing::Lockstep);
        let config = CaptureConfig::for_facings(&camera.facings()).unwrap();

        let (tx, mut rx) = frame_channel();
        let handle = camera.start_capture(&config, tx).unwrap();

        let mut seen = Vec::new();
        while let Some(frame) = rx.recv().await {
            seen.push(frame.timestamp);
        }
        assert_eq!(seen, vec![0.0, 0.1, 0.2]);
        assert_eq!(rx.dropped(), 0);
        drop(handle);
    }

    #[tokio::test]
    async fn test_capture_failure() {
        let trace = Trace::parse(TRACE).unwrap();
        let camera = ReplayCamera::new(trace, Pacing::Lockstep).with_capture_failure("no output");
        let config = CaptureConfig::for_facings(&camera.facings()).unwrap();
        let (tx, _rx) = frame_channel();
        assert!(matches!(
            camera.start_capture(&config, tx),
            Err(CameraError::Output(_))
        ));
    }
}
