use crate::common::{ExamId, ProctorError, Result};
use crate::enrollment::ExtractionReport;
use crate::guards::GuardStatus;
use crate::monitor::{FaceStatus, SessionMonitorState};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::SystemTime;

/// Frames are a little-endian u32 length followed by a bincode payload.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Request {
    Start(StartRequest),
    Stop(StopRequest),
    Status(StatusRequest),
    VerifyStudent(VerifyRequest),
    ExtractSignatures(ExtractRequest),
    GuardStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub session_id: String,
    pub exam_id: ExamId,
    pub student_label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StopRequest {
    pub session_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusRequest {
    pub session_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifyRequest {
    pub exam_id: ExamId,
    pub student_label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub exam_id: ExamId,
    pub images_folder: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Start(StartResponse),
    Stop(StopResponse),
    Status(StatusResponse),
    Verify(VerifyResponse),
    Extract(ExtractionReport),
    Guards(Vec<GuardStatus>),
    Error(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartResponse {
    pub started: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub running: bool,
    pub face_status: FaceStatus,
    pub identity_confirmed: bool,
    pub emotion: String,
    pub detected_objects: Vec<String>,
    pub camera_acquired: bool,
    pub last_update_time: Option<SystemTime>,
}

impl From<SessionMonitorState> for StatusResponse {
    fn from(state: SessionMonitorState) -> Self {
        Self {
            running: state.running,
            face_status: state.face_status,
            identity_confirmed: state.identity_confirmed,
            emotion: state.emotion,
            detected_objects: state.detected_objects,
            camera_acquired: state.camera_acquired,
            last_update_time: state.last_update_time,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifyResponse {
    pub authorized: bool,
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let data = bincode::serialize(message)
        .map_err(|e| ProctorError::Service(format!("Failed to serialize message: {}", e)))?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProctorError::Service(format!("Message too large: {} bytes", data.len())));
    }

    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(ProctorError::Service(format!("Message too large: {} bytes", len)));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf).map_err(|e| ProctorError::Service(format!("Failed to deserialize message: {}", e)))
}
