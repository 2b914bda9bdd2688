use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{ProctorError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub guards: GuardsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// Device indices tried in order until one opens.
    #[serde(default = "default_device_indices")]
    pub device_indices: Vec<u32>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_device_indices() -> Vec<u32> { vec![2, 1, 0] }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_indices: default_device_indices(),
            width: 640,
            height: 480,
            warmup_frames: 0,
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
    /// Emotion classifier; the status payload reports "unknown" when absent.
    #[serde(default)]
    pub affect_path: Option<PathBuf>,
    /// Only loaded in `face_plus_object_detection` mode.
    #[serde(default)]
    pub object_detector_path: Option<PathBuf>,
}

impl ModelConfig {
    /// Relative model paths are taken from `models_base`.
    pub fn resolve(&self, path: &Path, models_base: &Path) -> PathBuf {
        if path.is_relative() {
            models_base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
}

fn default_detection_confidence() -> f32 { 0.5 }
fn default_nms_iou() -> f32 { 0.45 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            confidence_threshold: default_detection_confidence(),
            nms_iou_threshold: default_nms_iou(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
    /// 1 for grayscale models, 3 for RGB.
    #[serde(default = "default_channels")]
    pub channels: u32,
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
}

fn default_channels() -> u32 { 3 }
fn default_embedding_size() -> usize { 128 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: 112,
            normalization_value: 127.5,
            channels: default_channels(),
            embedding_size: default_embedding_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    /// A face is confirmed when its distance to the reference is strictly below this.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,
}

fn default_distance_threshold() -> f32 { 0.6 }
fn default_metric() -> DistanceMetric { DistanceMetric::Euclidean }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            metric: default_metric(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    FaceOnly,
    FacePlusObjectDetection,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_mode")]
    pub mode: MonitorMode,
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Consecutive failed reads before `error_camera_lost` is published.
    #[serde(default = "default_max_read_failures")]
    pub max_consecutive_read_failures: u32,
    #[serde(default)]
    pub lock_input_on_detection: bool,
    #[serde(default = "default_object_confidence")]
    pub object_confidence: f32,
    #[serde(default = "default_forbidden_objects")]
    pub forbidden_objects: Vec<String>,
}

fn default_mode() -> MonitorMode { MonitorMode::FaceOnly }
fn default_frame_interval() -> u64 { 500 }
fn default_max_read_failures() -> u32 { 10 }
fn default_object_confidence() -> f32 { 0.5 }

fn default_forbidden_objects() -> Vec<String> {
    ["cell phone", "laptop", "tv", "remote", "book"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            frame_interval_ms: default_frame_interval(),
            max_consecutive_read_failures: default_max_read_failures(),
            lock_input_on_detection: false,
            object_confidence: default_object_confidence(),
            forbidden_objects: default_forbidden_objects(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GuardsConfig {
    #[serde(default = "default_remote_access_guard")]
    pub remote_access: GuardConfig,
    #[serde(default = "default_capture_guard")]
    pub capture: GuardConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GuardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_guard_interval")]
    pub interval_ms: u64,
    pub keywords: Vec<String>,
    /// How long the overlay stays up after a detection. Zero disables it.
    #[serde(default)]
    pub overlay_duration_ms: u64,
}

fn default_guard_interval() -> u64 { 2000 }

fn default_remote_access_guard() -> GuardConfig {
    GuardConfig {
        enabled: false,
        interval_ms: default_guard_interval(),
        keywords: [
            "anydesk", "teamviewer", "rustdesk", "remmina", "x11vnc", "vncserver",
            "tigervnc", "vino-server", "krfb", "xrdp", "nxserver", "chrome-remote-desktop",
            "splashtop", "logmein", "supremo", "meshagent",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        overlay_duration_ms: 0,
    }
}

fn default_capture_guard() -> GuardConfig {
    GuardConfig {
        enabled: false,
        interval_ms: 1000,
        keywords: [
            "obs", "simplescreenrecorder", "kazam", "peek", "vokoscreen", "recordmydesktop",
            "kooha", "flameshot", "shutter", "ksnip", "spectacle", "gnome-screenshot", "x11grab",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        overlay_duration_ms: 5000,
    }
}

impl Default for GuardsConfig {
    fn default() -> Self {
        Self {
            remote_access: default_remote_access_guard(),
            capture: default_capture_guard(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the dev/system signature directory when set.
    #[serde(default)]
    pub signatures_dir: Option<PathBuf>,
    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProctorError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ProctorError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.device_indices.is_empty() {
            return Err(ProctorError::Config("camera.device_indices must not be empty".into()));
        }
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(ProctorError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(ProctorError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ProctorError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(ProctorError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(ProctorError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(ProctorError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.channels != 1 && self.recognizer.channels != 3 {
            return Err(ProctorError::Config(format!(
                "Recognizer channels must be 1 or 3, got {}", self.recognizer.channels
            )));
        }

        if self.matcher.distance_threshold <= 0.0 || self.matcher.distance_threshold > 2.0 {
            return Err(ProctorError::Config(format!(
                "Distance threshold must be in (0.0, 2.0], got {}",
                self.matcher.distance_threshold
            )));
        }

        if self.monitor.frame_interval_ms < 50 || self.monitor.frame_interval_ms > 10_000 {
            return Err(ProctorError::Config(format!(
                "Frame interval must be between 50 and 10000 ms, got {}",
                self.monitor.frame_interval_ms
            )));
        }
        if self.monitor.max_consecutive_read_failures == 0 {
            return Err(ProctorError::Config(
                "monitor.max_consecutive_read_failures must be at least 1".into()
            ));
        }
        if self.monitor.mode == MonitorMode::FacePlusObjectDetection
            && self.models.object_detector_path.is_none()
        {
            return Err(ProctorError::Config(
                "face_plus_object_detection mode requires models.object_detector_path".into()
            ));
        }

        for (name, guard) in [("remote_access", &self.guards.remote_access), ("capture", &self.guards.capture)] {
            if guard.enabled && guard.interval_ms < 100 {
                return Err(ProctorError::Config(format!(
                    "guards.{}.interval_ms must be at least 100, got {}", name, guard.interval_ms
                )));
            }
        }

        Ok(())
    }
}
