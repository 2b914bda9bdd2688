use crate::enrollment::{ExtractionReport, SignatureExtractor};
use crate::guards::GuardSet;
use crate::monitor::MonitorRegistry;
use crate::service::protocol::{
    Request, Response, StartResponse, StatusResponse, StopResponse, VerifyResponse,
};
use crate::storage::SignatureStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maps requests onto the registry, the signature store and the guards.
pub struct ProctorService {
    registry: Arc<MonitorRegistry>,
    store: Arc<dyn SignatureStore>,
    extractor: Option<Arc<SignatureExtractor>>,
    guards: Arc<GuardSet>,
    /// Relative upload folders are resolved against this directory.
    uploads_dir: Option<PathBuf>,
}

impl ProctorService {
    pub fn new(registry: Arc<MonitorRegistry>, store: Arc<dyn SignatureStore>, guards: Arc<GuardSet>) -> Self {
        Self { registry, store, extractor: None, guards, uploads_dir: None }
    }

    pub fn with_extractor(mut self, extractor: Arc<SignatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_uploads_dir(mut self, uploads_dir: PathBuf) -> Self {
        self.uploads_dir = Some(uploads_dir);
        self
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::Start(req) => {
                if req.session_id.is_empty() {
                    return Response::Error("session_id must not be empty".into());
                }
                tracing::info!("Start request for session {} (exam {})", req.session_id, req.exam_id);
                let started = self.registry.start_monitoring(&req.session_id, req.exam_id, &req.student_label);
                Response::Start(StartResponse { started })
            }
            Request::Stop(req) => {
                tracing::info!("Stop request for session {}", req.session_id);
                let stopped = self.registry.stop_monitoring(&req.session_id);
                Response::Stop(StopResponse { stopped })
            }
            Request::Status(req) => {
                Response::Status(StatusResponse::from(self.registry.get_status(&req.session_id)))
            }
            Request::VerifyStudent(req) => {
                let authorized = self.store.verify_student(req.exam_id, &req.student_label);
                tracing::info!(
                    "Verify '{}' for exam {}: {}",
                    req.student_label,
                    req.exam_id,
                    if authorized { "authorized" } else { "not enrolled" }
                );
                Response::Verify(VerifyResponse { authorized })
            }
            Request::ExtractSignatures(req) => match &self.extractor {
                Some(extractor) => {
                    let folder = self.resolve_folder(&req.images_folder);
                    tracing::info!("Extracting signatures for exam {} from {}", req.exam_id, folder.display());
                    let report: ExtractionReport = extractor.extract_signatures(req.exam_id, &folder);
                    Response::Extract(report)
                }
                None => Response::Error("Signature extraction is not available on this daemon".into()),
            },
            Request::GuardStatus => Response::Guards(self.guards.statuses()),
        }
    }

    fn resolve_folder(&self, folder: &Path) -> PathBuf {
        match &self.uploads_dir {
            Some(base) if folder.is_relative() => base.join(folder),
            _ => folder.to_path_buf(),
        }
    }
}
