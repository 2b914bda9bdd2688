// Core modules
pub mod common;
pub mod core;
pub mod camera;
pub mod storage;
pub mod enrollment;
pub mod monitor;
pub mod guards;
pub mod service;

// Re-export commonly used types
pub use common::{Config, DevMode, ProctorError, Result, ExamId};
pub use core::{
    FaceDetector, FaceBox, FaceDetection, FaceRecognizer, FaceEmbedding, Embedding,
    IdentityMatcher, MatchResult, MatchStatus, cosine_similarity, euclidean_distance,
};
pub use camera::{CameraProvider, FrameSource};
pub use storage::{FacialSignature, SignatureSet, SignatureStore, FileSignatureStore, normalize_label};
pub use enrollment::{SignatureExtractor, ExtractionReport};
pub use monitor::{FaceStatus, MonitorContext, MonitorRegistry, SessionMonitor, SessionMonitorState};
pub use guards::{Guard, GuardSet, GuardStatus, Overlay, ThreatScanner};
pub use service::{ProctorService, ServiceClient, protocol};
