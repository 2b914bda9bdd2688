//! One background worker per exam session.
//!
//! The worker owns the camera. It reads a frame every
//! `monitor.frame_interval_ms`, runs the identity matcher and publishes a
//! [`SessionMonitorState`] snapshot under the monitor lock. Readers only ever
//! take that lock, so `status()` never waits on the camera or the models.

use crate::camera::{acquire_camera, CameraProvider, FrameSource};
use crate::common::config::{MonitorConfig, MonitorMode};
use crate::common::ExamId;
use crate::core::{crop_face, AffectClassification, IdentityMatcher, MatchResult, MatchStatus, ObjectDetection};
use crate::guards::{LoggingOverlay, Overlay, SharedOverlay};
use crate::monitor::status::{FaceStatus, SessionMonitorState, EMOTION_ERROR};
use crate::storage::{normalize_label, SignatureStore};
use image::DynamicImage;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Everything a monitor needs, shared by all monitors of a registry.
#[derive(Clone)]
pub struct MonitorContext {
    pub camera: Arc<dyn CameraProvider>,
    pub signatures: Arc<dyn SignatureStore>,
    pub matcher: Arc<IdentityMatcher>,
    pub affect: Option<Arc<dyn AffectClassification>>,
    pub objects: Option<Arc<dyn ObjectDetection>>,
    /// Shared by every monitor; each session holds it under its own id.
    pub input_lock: Arc<SharedOverlay>,
    pub config: MonitorConfig,
    pub camera_indices: Vec<u32>,
}

impl MonitorContext {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        signatures: Arc<dyn SignatureStore>,
        matcher: Arc<IdentityMatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            camera,
            signatures,
            matcher,
            affect: None,
            objects: None,
            input_lock: Arc::new(SharedOverlay::new(Arc::new(LoggingOverlay::new()))),
            config,
            camera_indices: vec![2, 1, 0],
        }
    }

    pub fn with_affect(mut self, affect: Arc<dyn AffectClassification>) -> Self {
        self.affect = Some(affect);
        self
    }

    pub fn with_objects(mut self, objects: Arc<dyn ObjectDetection>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn with_input_lock(mut self, input_lock: Arc<dyn Overlay>) -> Self {
        self.input_lock = Arc::new(SharedOverlay::new(input_lock));
        self
    }

    pub fn with_camera_indices(mut self, indices: Vec<u32>) -> Self {
        self.camera_indices = indices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Initializing,
    Running,
    Stopped,
    Failed,
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

struct Lifecycle {
    phase: MonitorPhase,
    worker: Option<Worker>,
}

pub struct SessionMonitor {
    session_id: String,
    context: Arc<MonitorContext>,
    state: Arc<Mutex<SessionMonitorState>>,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionMonitor {
    pub fn new(session_id: &str, context: Arc<MonitorContext>) -> Self {
        Self {
            session_id: session_id.to_string(),
            context,
            state: Arc::new(Mutex::new(SessionMonitorState::pending(session_id))),
            lifecycle: Mutex::new(Lifecycle { phase: MonitorPhase::Initializing, worker: None }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> MonitorPhase {
        self.lifecycle.lock().phase
    }

    /// True when the monitor is running after the call. A running monitor
    /// answers true again; a failed or stopped one answers false.
    pub fn start(&self, exam_id: ExamId, student_label: &str) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            MonitorPhase::Running => return true,
            MonitorPhase::Failed | MonitorPhase::Stopped => return false,
            MonitorPhase::Initializing => {}
        }

        let label = normalize_label(student_label);
        {
            let mut state = self.state.lock();
            state.exam_id = Some(exam_id);
            state.student_label = Some(label.clone());
        }

        let camera = match acquire_camera(self.context.camera.as_ref(), &self.context.camera_indices) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::warn!("Session {}: {}", self.session_id, e);
                return self.fail(&mut lifecycle, FaceStatus::ErrorNoCamera);
            }
        };
        self.state.lock().camera_acquired = true;

        let signatures = match self.context.signatures.get_signature_set(exam_id) {
            Ok(set) if !set.is_empty() => set,
            Ok(_) => {
                tracing::warn!("Session {}: exam {} has an empty roster", self.session_id, exam_id);
                drop(camera);
                return self.fail(&mut lifecycle, FaceStatus::ErrorNoSignatures);
            }
            Err(e) => {
                tracing::warn!("Session {}: {}", self.session_id, e);
                drop(camera);
                return self.fail(&mut lifecycle, FaceStatus::ErrorNoSignatures);
            }
        };

        let reference = match signatures.find(&label) {
            Some(signature) => signature.feature_vector.clone(),
            None => {
                tracing::warn!(
                    "Session {}: '{}' is not enrolled for exam {}",
                    self.session_id,
                    label,
                    exam_id
                );
                drop(camera);
                return self.fail(&mut lifecycle, FaceStatus::ErrorStudentNotFound);
            }
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = MonitorWorker {
            session_id: self.session_id.clone(),
            context: Arc::clone(&self.context),
            state: Arc::clone(&self.state),
            camera: Some(camera),
            reference,
            lock_holder: format!("{}#{}", self.session_id, NEXT_WORKER.fetch_add(1, Ordering::Relaxed)),
            input_locked: false,
        };
        self.state.lock().running = true;

        let spawned = std::thread::Builder::new()
            .name(format!("monitor-{}", self.session_id))
            .spawn(move || worker.run(stop_rx));

        match spawned {
            Ok(handle) => {
                lifecycle.worker = Some(Worker { handle, stop_tx });
                lifecycle.phase = MonitorPhase::Running;
                tracing::info!(
                    "Monitoring session {} (exam {}, student {})",
                    self.session_id,
                    exam_id,
                    label
                );
                true
            }
            Err(e) => {
                tracing::error!("Session {}: cannot spawn monitor thread: {}", self.session_id, e);
                self.fail(&mut lifecycle, FaceStatus::ErrorAnalysis)
            }
        }
    }

    fn fail(&self, lifecycle: &mut Lifecycle, status: FaceStatus) -> bool {
        lifecycle.phase = MonitorPhase::Failed;
        let mut state = self.state.lock();
        state.running = false;
        state.camera_acquired = false;
        state.identity_confirmed = false;
        state.face_status = status;
        state.last_update_time = Some(SystemTime::now());
        false
    }

    /// Idempotent. Returns once the worker has exited and released the camera.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(lifecycle.phase, MonitorPhase::Initializing | MonitorPhase::Running) {
            lifecycle.phase = MonitorPhase::Stopped;
        }

        if let Some(worker) = lifecycle.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                tracing::error!("Monitor thread for session {} panicked", self.session_id);
            }
            tracing::info!("Stopped monitoring session {}", self.session_id);
        }

        self.state.lock().running = false;
    }

    pub fn status(&self) -> SessionMonitorState {
        self.state.lock().clone()
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lives on the monitor thread. Its drop releases the camera and the input
/// lock on every exit path, unwinding included.
struct MonitorWorker {
    session_id: String,
    context: Arc<MonitorContext>,
    state: Arc<Mutex<SessionMonitorState>>,
    camera: Option<Box<dyn FrameSource>>,
    reference: Vec<f32>,
    /// Unique per worker so a restarted session never releases its predecessor's hold.
    lock_holder: String,
    input_locked: bool,
}

struct FrameAnalysis {
    matched: MatchResult,
    emotion: Option<String>,
    objects: Option<Vec<String>>,
}

impl MonitorWorker {
    fn run(mut self, stop_rx: Receiver<()>) {
        let config = self.context.config.clone();
        let interval = Duration::from_millis(config.frame_interval_ms);
        let mut read_failures = 0u32;

        loop {
            let cycle_start = Instant::now();

            match self.read_frame() {
                Some(Ok(frame)) => {
                    if read_failures >= config.max_consecutive_read_failures {
                        tracing::info!("Session {}: camera recovered", self.session_id);
                    }
                    read_failures = 0;
                    let analysis = self.analyze(&frame);
                    self.publish(analysis);
                }
                Some(Err(e)) => {
                    read_failures = read_failures.saturating_add(1);
                    tracing::debug!("Session {}: frame read failed: {}", self.session_id, e);
                    if read_failures == config.max_consecutive_read_failures {
                        tracing::warn!(
                            "Session {}: {} consecutive read failures, camera lost",
                            self.session_id,
                            read_failures
                        );
                        let mut state = self.state.lock();
                        state.face_status = FaceStatus::ErrorCameraLost;
                        state.identity_confirmed = false;
                        state.last_update_time = Some(SystemTime::now());
                    }
                }
                None => break,
            }

            let wait = interval.saturating_sub(cycle_start.elapsed());
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        }
    }

    fn read_frame(&mut self) -> Option<crate::common::Result<DynamicImage>> {
        self.camera.as_mut().map(|camera| camera.read_frame())
    }

    fn analyze(&mut self, frame: &DynamicImage) -> FrameAnalysis {
        let context = Arc::clone(&self.context);

        let matched = panic::catch_unwind(AssertUnwindSafe(|| context.matcher.match_frame(frame, &self.reference)))
            .unwrap_or_else(|_| {
                tracing::error!("Session {}: identity matcher panicked", self.session_id);
                MatchResult { status: MatchStatus::ErrorAnalysis, distance: None, face: None }
            });

        let emotion = match (&context.affect, &matched.face) {
            (Some(affect), Some(face)) if matched.status == MatchStatus::Confirmed => {
                let classified = panic::catch_unwind(AssertUnwindSafe(|| {
                    crop_face(frame, face).and_then(|crop| affect.classify(&crop))
                }));
                Some(match classified {
                    Ok(Ok(emotion)) => emotion,
                    Ok(Err(e)) => {
                        tracing::debug!("Session {}: emotion analysis failed: {}", self.session_id, e);
                        EMOTION_ERROR.to_string()
                    }
                    Err(_) => {
                        tracing::error!("Session {}: emotion classifier panicked", self.session_id);
                        EMOTION_ERROR.to_string()
                    }
                })
            }
            _ => None,
        };

        let objects = match (&context.objects, context.config.mode) {
            (Some(detector), MonitorMode::FacePlusObjectDetection) => {
                match panic::catch_unwind(AssertUnwindSafe(|| detector.detect_objects(frame))) {
                    Ok(Ok(found)) => {
                        let mut labels: Vec<String> = Vec::new();
                        for object in found {
                            if !labels.contains(&object.label) {
                                labels.push(object.label);
                            }
                        }
                        Some(labels)
                    }
                    Ok(Err(e)) => {
                        tracing::debug!("Session {}: object detection failed: {}", self.session_id, e);
                        None
                    }
                    Err(_) => {
                        tracing::error!("Session {}: object detector panicked", self.session_id);
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(labels) = &objects {
            self.update_input_lock(labels);
        }

        FrameAnalysis { matched, emotion, objects }
    }

    fn update_input_lock(&mut self, labels: &[String]) {
        if !self.context.config.lock_input_on_detection {
            return;
        }
        if !labels.is_empty() && !self.input_locked {
            self.context
                .input_lock
                .hold(&self.lock_holder, &format!("session {}: {}", self.session_id, labels.join(", ")));
            self.input_locked = true;
        } else if labels.is_empty() && self.input_locked {
            self.context.input_lock.unhold(&self.lock_holder);
            self.input_locked = false;
        }
    }

    fn publish(&self, analysis: FrameAnalysis) {
        let mut state = self.state.lock();
        state.face_status = analysis.matched.status.into();
        state.identity_confirmed = analysis.matched.status == MatchStatus::Confirmed;
        if let Some(emotion) = analysis.emotion {
            state.emotion = emotion;
        }
        if let Some(objects) = analysis.objects {
            state.detected_objects = objects;
        }
        state.frames_analyzed += 1;
        state.last_update_time = Some(SystemTime::now());
    }
}

impl Drop for MonitorWorker {
    fn drop(&mut self) {
        drop(self.camera.take());
        if self.input_locked {
            self.context.input_lock.unhold(&self.lock_holder);
            self.input_locked = false;
        }

        let mut state = self.state.lock();
        state.running = false;
        state.camera_acquired = false;
        state.last_update_time = Some(SystemTime::now());
    }
}
