//! Pose observations, arm selection, and elbow angle
//!
//! The pose model itself is an external capability (`PoseEstimator`). This
//! module only consumes its output: named joints with normalized positions and
//! confidences. From one observation we pick the better-tracked arm and turn
//! its shoulder/elbow/wrist into an elbow angle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frame::FrameSample;

/// Smallest |v1|·|v2| used when joints coincide
const ANGLE_EPSILON: f64 = 1e-4;

/// Default per-joint confidence a side has to exceed
pub const DEFAULT_MIN_JOINT_CONFIDENCE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Shoulder,
    Elbow,
    Wrist,
}

/// One of the six arm joints the counter cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    LeftShoulder,
    LeftElbow,
    LeftWrist,
    RightShoulder,
    RightElbow,
    RightWrist,
}

impl JointName {
    pub fn new(side: Side, kind: JointKind) -> Self {
        match (side, kind) {
            (Side::Left, JointKind::Shoulder) => JointName::LeftShoulder,
            (Side::Left, JointKind::Elbow) => JointName::LeftElbow,
            (Side::Left, JointKind::Wrist) => JointName::LeftWrist,
            (Side::Right, JointKind::Shoulder) => JointName::RightShoulder,
            (Side::Right, JointKind::Elbow) => JointName::RightElbow,
            (Side::Right, JointKind::Wrist) => JointName::RightWrist,
        }
    }

    pub fn side(self) -> Side {
        match self {
            JointName::LeftShoulder | JointName::LeftElbow | JointName::LeftWrist => Side::Left,
            _ => Side::Right,
        }
    }

    pub fn kind(self) -> JointKind {
        match self {
            JointName::LeftShoulder | JointName::RightShoulder => JointKind::Shoulder,
            JointName::LeftElbow | JointName::RightElbow => JointKind::Elbow,
            JointName::LeftWrist | JointName::RightWrist => JointKind::Wrist,
        }
    }
}

/// 2D position normalized to [0,1]×[0,1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single joint as reported by the pose model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointObservation {
    pub joint: JointName,
    #[serde(flatten)]
    pub position: Point2,
    pub confidence: f64,
}

impl JointObservation {
    pub fn new(joint: JointName, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            joint,
            position: Point2::new(x, y),
            confidence,
        }
    }
}

/// Joints of one detected person in one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseObservation {
    pub joints: Vec<JointObservation>,
}

impl PoseObservation {
    pub fn new(joints: Vec<JointObservation>) -> Self {
        Self { joints }
    }

    /// Look up a joint. When the model reports a joint twice the first wins.
    pub fn joint(&self, name: JointName) -> Option<&JointObservation> {
        self.joints.iter().find(|j| j.joint == name)
    }
}

/// The shoulder/elbow/wrist of the arm chosen for this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmJoints {
    pub side: Side,
    pub shoulder: Point2,
    pub elbow: Point2,
    pub wrist: Point2,
    /// Minimum confidence of the three joints
    pub confidence: f64,
}

impl ArmJoints {
    /// Elbow angle of this arm in degrees
    pub fn elbow_angle(&self) -> f64 {
        elbow_angle(self.shoulder, self.elbow, self.wrist)
    }
}

/// Errors surfaced by a pose estimator. All of them are per-frame and non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("pose request failed: {0}")]
    Request(String),

    #[error("frame could not be decoded: {0}")]
    InvalidFrame(String),
}

/// Body pose model, consumed as an opaque capability
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    /// Whether pose estimation can run on this device at all
    fn is_supported(&self) -> bool {
        true
    }

    /// Estimate the pose of the (single) person in the frame.
    ///
    /// `Ok(None)` means no body was found.
    async fn estimate(&self, frame: &FrameSample) -> Result<Option<PoseObservation>, PoseError>;
}

/// Pick the better-tracked arm, or `None` if neither side is usable.
///
/// A side qualifies when shoulder, elbow and wrist are all present with
/// confidence strictly above `min_confidence`. Between two qualifying sides the
/// higher minimum confidence wins; exact ties go to the left side.
pub fn select_arm(pose: &PoseObservation, min_confidence: f64) -> Option<ArmJoints> {
    let left = arm_for_side(pose, Side::Left, min_confidence);
    let right = arm_for_side(pose, Side::Right, min_confidence);

    match (left, right) {
        (Some(l), Some(r)) => {
            if r.confidence > l.confidence {
                Some(r)
            } else {
                Some(l)
            }
        }
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

fn arm_for_side(pose: &PoseObservation, side: Side, min_confidence: f64) -> Option<ArmJoints> {
    let tracked = |kind| {
        pose.joint(JointName::new(side, kind))
            .filter(|j| j.confidence > min_confidence)
    };

    let shoulder = tracked(JointKind::Shoulder)?;
    let elbow = tracked(JointKind::Elbow)?;
    let wrist = tracked(JointKind::Wrist)?;

    Some(ArmJoints {
        side,
        shoulder: shoulder.position,
        elbow: elbow.position,
        wrist: wrist.position,
        confidence: shoulder.confidence.min(elbow.confidence).min(wrist.confidence),
    })
}

/// Angle at `elbow` between the segments to `shoulder` and `wrist`, in degrees.
///
/// Always within [0, 180]. Coincident joints give 90° (cosine 0 over the
/// epsilon floor) rather than NaN.
pub fn elbow_angle(shoulder: Point2, elbow: Point2, wrist: Point2) -> f64 {
    let v1 = (shoulder.x - elbow.x, shoulder.y - elbow.y);
    let v2 = (wrist.x - elbow.x, wrist.y - elbow.y);

    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let norms = (v1.0.hypot(v1.1) * v2.0.hypot(v2.1)).max(ANGLE_EPSILON);

    let cosine = (dot / norms).clamp(-1.0, 1.0);
    cosine.acos().to_degrees()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a pose whose arm on `side` bends to `angle` degrees
    pub(crate) fn arm_pose(side: Side, angle: f64, confidence: f64) -> Vec<JointObservation> {
        let elbow = Point2::new(0.5, 0.5);
        let rad = angle.to_radians();
        vec![
            JointObservation::new(JointName::new(side, JointKind::Shoulder), 0.5, 0.3, confidence),
            JointObservation::new(JointName::new(side, JointKind::Elbow), elbow.x, elbow.y, confidence),
            JointObservation::new(
                JointName::new(side, JointKind::Wrist),
                elbow.x + 0.2 * rad.sin(),
                elbow.y - 0.2 * rad.cos(),
                confidence,
            ),
        ]
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_right_angle() {
        let angle = elbow_angle(Point2::new(0.0, 1.0), Point2::new(0.0, 0.0), Point2::new(1.0, 0.0));
        assert!(approx(angle, 90.0));
    }

    #[test]
    fn test_straight_arm() {
        let angle = elbow_angle(Point2::new(0.0, 0.0), Point2::new(0.5, 0.0), Point2::new(1.0, 0.0));
        assert!(approx(angle, 180.0));
    }

    #[test]
    fn test_folded_arm() {
        let angle = elbow_angle(Point2::new(1.0, 0.0), Point2::new(0.0, 0.0), Point2::new(0.5, 0.0));
        assert!(approx(angle, 0.0));
    }

    #[test]
    fn test_coincident_joints_do_not_nan() {
        let p = Point2::new(0.4, 0.4);
        let angle = elbow_angle(p, p, p);
        assert!(angle.is_finite());
        assert!((0.0..=180.0).contains(&angle));
    }

    #[test]
    fn test_arm_pose_helper_angle() {
        let pose = PoseObservation::new(arm_pose(Side::Left, 120.0, 0.9));
        let arm = select_arm(&pose, DEFAULT_MIN_JOINT_CONFIDENCE).unwrap();
        assert!(approx(arm.elbow_angle(), 120.0));
    }

    #[test]
    fn test_select_tie_prefers_left() {
        let mut joints = arm_pose(Side::Left, 90.0, 0.8);
        joints.extend(arm_pose(Side::Right, 150.0, 0.8));
        let arm = select_arm(&PoseObservation::new(joints), 0.25).unwrap();
        assert_eq!(arm.side, Side::Left);
    }

    #[test]
    fn test_select_higher_confidence_side() {
        let mut joints = arm_pose(Side::Left, 90.0, 0.6);
        joints.extend(arm_pose(Side::Right, 150.0, 0.7));
        let arm = select_arm(&PoseObservation::new(joints), 0.25).unwrap();
        assert_eq!(arm.side, Side::Right);
        assert!(approx(arm.confidence, 0.7));
    }

    #[test]
    fn test_select_uses_min_of_three() {
        let mut joints = arm_pose(Side::Left, 90.0, 0.9);
        // Weak left wrist drags the left side below the right
        joints[2].confidence = 0.3;
        joints.extend(arm_pose(Side::Right, 150.0, 0.5));
        let arm = select_arm(&PoseObservation::new(joints), 0.25).unwrap();
        assert_eq!(arm.side, Side::Right);
    }

    #[test]
    fn test_select_threshold_is_exclusive() {
        let joints = arm_pose(Side::Left, 90.0, 0.25);
        assert!(select_arm(&PoseObservation::new(joints), 0.25).is_none());
    }

    #[test]
    fn test_select_missing_joint() {
        let mut joints = arm_pose(Side::Right, 90.0, 0.9);
        joints.retain(|j| j.joint != JointName::RightElbow);
        assert!(select_arm(&PoseObservation::new(joints), 0.25).is_none());
    }

    #[test]
    fn test_joint_observation_json() {
        let joint = JointObservation::new(JointName::LeftWrist, 0.25, 0.75, 0.9);
        let json = serde_json::to_value(joint).unwrap();
        assert_eq!(json["joint"], "left_wrist");
        assert_eq!(json["x"], 0.25);
        assert_eq!(json["y"], 0.75);
    }

    #[test]
    fn test_joint_name_parts() {
        let name = JointName::new(Side::Right, JointKind::Elbow);
        assert_eq!(name, JointName::RightElbow);
        assert_eq!(name.side(), Side::Right);
        assert_eq!(name.kind(), JointKind::Elbow);
    }
}
