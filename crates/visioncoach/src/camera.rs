//! Camera capability and session state
//!
//! The platform camera is consumed through `CameraDevice`. The controller asks
//! it for authorization, picks a facing, and starts capture with a
//! `FrameSender`; everything after that flows through the frame channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frame::{Facing, FrameSender};

/// Camera lifecycle as shown to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    #[default]
    Idle,
    RequestingPermission,
    Ready,
    /// Recoverable only by a settings change and a restart
    Denied,
    /// No camera or no pose support on this device
    Unavailable,
    /// Capture pipeline could not be configured
    Failed,
}

impl CameraState {
    /// Whether the live preview may be shown in this state
    pub fn allows_preview(self) -> bool {
        matches!(
            self,
            CameraState::Idle | CameraState::RequestingPermission | CameraState::Ready
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CameraState::Denied | CameraState::Unavailable | CameraState::Failed
        )
    }
}

/// Camera authorization as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Authorized,
    /// Never asked; requesting shows the system prompt
    NotDetermined,
    Denied,
    Restricted,
    Unknown,
}

/// How the capture pipeline should be set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub facing: Facing,
    /// Mirror the image horizontally (front camera)
    pub mirrored: bool,
    /// Drop frames that arrive while the previous one is still being processed
    pub discard_late_frames: bool,
}

impl CaptureConfig {
    /// Front camera if present, otherwise back. Front output is mirrored.
    pub fn for_facings(available: &[Facing]) -> Option<Self> {
        let facing = if available.contains(&Facing::Front) {
            Facing::Front
        } else if available.contains(&Facing::Back) {
            Facing::Back
        } else {
            return None;
        };

        Some(Self {
            facing,
            mirrored: facing == Facing::Front,
            discard_late_frames: true,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("no camera with facing {0:?}")]
    NoDevice(Facing),

    #[error("failed to attach capture input: {0}")]
    Input(String),

    #[error("failed to attach capture output: {0}")]
    Output(String),
}

/// A running capture. Dropping it or calling `stop` ends frame delivery.
pub trait CaptureHandle: Send {
    /// Stop capture. Must be idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Platform camera, consumed as an external capability
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Facings present on this device. Empty means no camera.
    fn facings(&self) -> Vec<Facing>;

    fn authorization(&self) -> Authorization;

    /// Show the permission prompt. Resolves when the user answers.
    async fn request_access(&self) -> bool;

    /// Configure and start capture, delivering frames into `frames`
    fn start_capture(
        &self,
        config: &CaptureConfig,
        frames: FrameSender,
    ) -> Result<Box<dyn CaptureHandle>, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_front_and_mirrors() {
        let config = CaptureConfig::for_facings(&[Facing::Back, Facing::Front]).unwrap();
        assert_eq!(config.facing, Facing::Front);
        assert!(config.mirrored);
        assert!(config.discard_late_frames);
    }

    #[test]
    fn test_falls_back_to_back() {
        let config = CaptureConfig::for_facings(&[Facing::Back]).unwrap();
        assert_eq!(config.facing, Facing::Back);
        assert!(!config.mirrored);
    }

    #[test]
    fn test_no_camera() {
        assert!(CaptureConfig::for_facings(&[]).is_none());
    }

    #[test]
    fn test_preview_states() {
        assert!(CameraState::Idle.allows_preview());
        assert!(CameraState::RequestingPermission.allows_preview());
        assert!(CameraState::Ready.allows_preview());
        assert!(!CameraState::Denied.allows_preview());
        assert!(!CameraState::Unavailable.allows_preview());
        assert!(!CameraState::Failed.allows_preview());
    }
}
