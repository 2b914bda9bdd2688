use crate::common::ExamId;
use crate::core::MatchStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStatus {
    /// No monitor exists for the session.
    Inactive,
    Pending,
    Confirmed,
    Mismatch,
    NoFace,
    MultipleFaces,
    ErrorAnalysis,
    ErrorNoCamera,
    ErrorNoSignatures,
    ErrorStudentNotFound,
    ErrorCameraLost,
}

impl FaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceStatus::Inactive => "inactive",
            FaceStatus::Pending => "pending",
            FaceStatus::Confirmed => "confirmed",
            FaceStatus::Mismatch => "mismatch",
            FaceStatus::NoFace => "no_face",
            FaceStatus::MultipleFaces => "multiple_faces",
            FaceStatus::ErrorAnalysis => "error_analysis",
            FaceStatus::ErrorNoCamera => "error_no_camera",
            FaceStatus::ErrorNoSignatures => "error_no_signatures",
            FaceStatus::ErrorStudentNotFound => "error_student_not_found",
            FaceStatus::ErrorCameraLost => "error_camera_lost",
        }
    }

    /// Initialization failures that leave the monitor permanently failed.
    pub fn is_init_failure(&self) -> bool {
        matches!(
            self,
            FaceStatus::ErrorNoCamera | FaceStatus::ErrorNoSignatures | FaceStatus::ErrorStudentNotFound
        )
    }
}

impl fmt::Display for FaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MatchStatus> for FaceStatus {
    fn from(status: MatchStatus) -> Self {
        match status {
            MatchStatus::Confirmed => FaceStatus::Confirmed,
            MatchStatus::Mismatch => FaceStatus::Mismatch,
            MatchStatus::NoFace => FaceStatus::NoFace,
            MatchStatus::MultipleFaces => FaceStatus::MultipleFaces,
            MatchStatus::ErrorAnalysis => FaceStatus::ErrorAnalysis,
        }
    }
}

pub const UNKNOWN_EMOTION: &str = "unknown";
pub const EMOTION_ERROR: &str = "error_analysis";

/// Point-in-time view of one session's monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMonitorState {
    pub session_id: String,
    pub exam_id: Option<ExamId>,
    pub student_label: Option<String>,
    pub running: bool,
    pub camera_acquired: bool,
    pub face_status: FaceStatus,
    pub identity_confirmed: bool,
    pub emotion: String,
    pub detected_objects: Vec<String>,
    pub frames_analyzed: u64,
    pub last_update_time: Option<SystemTime>,
}

impl SessionMonitorState {
    /// The answer for a session that has no monitor.
    pub fn inactive(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            exam_id: None,
            student_label: None,
            running: false,
            camera_acquired: false,
            face_status: FaceStatus::Inactive,
            identity_confirmed: false,
            emotion: UNKNOWN_EMOTION.to_string(),
            detected_objects: Vec::new(),
            frames_analyzed: 0,
            last_update_time: None,
        }
    }

    pub(crate) fn pending(session_id: &str) -> Self {
        Self {
            face_status: FaceStatus::Pending,
            ..Self::inactive(session_id)
        }
    }
}
