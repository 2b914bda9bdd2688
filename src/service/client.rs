use crate::common::{ExamId, ProctorError, Result};
use crate::enrollment::ExtractionReport;
use crate::guards::GuardStatus;
use crate::service::protocol::{
    read_frame, write_frame, ExtractRequest, Request, Response, StartRequest, StatusRequest,
    StatusResponse, StopRequest, VerifyRequest,
};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct ServiceClient {
    socket_path: PathBuf,
    retries: u32,
}

impl ServiceClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into(), retries: 3 }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn start(&self, session_id: &str, exam_id: ExamId, student_label: &str) -> Result<bool> {
        match self.request(&Request::Start(StartRequest {
            session_id: session_id.to_string(),
            exam_id,
            student_label: student_label.to_string(),
        }))? {
            Response::Start(resp) => Ok(resp.started),
            other => Err(unexpected(other)),
        }
    }

    pub fn stop(&self, session_id: &str) -> Result<bool> {
        match self.request(&Request::Stop(StopRequest { session_id: session_id.to_string() }))? {
            Response::Stop(resp) => Ok(resp.stopped),
            other => Err(unexpected(other)),
        }
    }

    pub fn status(&self, session_id: &str) -> Result<StatusResponse> {
        match self.request(&Request::Status(StatusRequest { session_id: session_id.to_string() }))? {
            Response::Status(resp) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    pub fn verify_student(&self, exam_id: ExamId, student_label: &str) -> Result<bool> {
        match self.request(&Request::VerifyStudent(VerifyRequest {
            exam_id,
            student_label: student_label.to_string(),
        }))? {
            Response::Verify(resp) => Ok(resp.authorized),
            other => Err(unexpected(other)),
        }
    }

    pub fn extract_signatures(&self, exam_id: ExamId, images_folder: &Path) -> Result<ExtractionReport> {
        match self.request(&Request::ExtractSignatures(ExtractRequest {
            exam_id,
            images_folder: images_folder.to_path_buf(),
        }))? {
            Response::Extract(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub fn guard_status(&self) -> Result<Vec<GuardStatus>> {
        match self.request(&Request::GuardStatus)? {
            Response::Guards(statuses) => Ok(statuses),
            other => Err(unexpected(other)),
        }
    }

    pub fn request(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect_with_retry()?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut last_error = None;
        for attempt in 0..self.retries {
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    // extraction over a large upload folder can take a while
                    stream.set_read_timeout(Some(Duration::from_secs(120)))?;
                    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect attempt {} to {} failed: {}", attempt + 1, self.socket_path.display(), e);
                    last_error = Some(e);
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        }

        Err(ProctorError::Service(format!(
            "Failed to connect to {}: {}. Is exam-proctord running?",
            self.socket_path.display(),
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "no attempts made".into())
        )))
    }
}

fn unexpected(response: Response) -> ProctorError {
    match response {
        Response::Error(msg) => ProctorError::Service(msg),
        other => ProctorError::Service(format!("Unexpected response: {:?}", other)),
    }
}
