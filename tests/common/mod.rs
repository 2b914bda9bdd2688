#![allow(dead_code)]

use exam_proctor::camera::{CameraProvider, FrameSource};
use exam_proctor::common::config::{MatcherConfig, MonitorConfig};
use exam_proctor::core::{
    AffectClassification, DetectedObject, FaceBox, FaceDetection, FaceEmbedding, IdentityMatcher, ObjectDetection,
};
use exam_proctor::monitor::MonitorContext;
use exam_proctor::storage::{FacialSignature, FileSignatureStore, SignatureStore};
use exam_proctor::{ProctorError, Result};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// What the fake camera is looking at. Encoded into pixel (0, 0) as
/// `[faces, id_a, id_b]` so the fake models only need the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    pub faces: u8,
    pub identity: [u8; 2],
    pub phone_visible: bool,
}

impl Scene {
    pub fn student(identity: [u8; 2]) -> Self {
        Self { faces: 1, identity, phone_visible: false }
    }

    pub fn empty() -> Self {
        Self { faces: 0, identity: [0, 0], phone_visible: false }
    }
}

pub const ALICE: [u8; 2] = [200, 10];
pub const BOB: [u8; 2] = [10, 200];

pub fn signature_of(identity: [u8; 2]) -> Vec<f32> {
    vec![identity[0] as f32 / 255.0, identity[1] as f32 / 255.0]
}

pub fn render(scene: Scene) -> DynamicImage {
    let mut image = RgbImage::new(64, 64);
    image.put_pixel(0, 0, Rgb([scene.faces, scene.identity[0], scene.identity[1]]));
    image.put_pixel(1, 0, Rgb([scene.phone_visible as u8, 0, 0]));
    DynamicImage::ImageRgb8(image)
}

/// Shared camera state: the scene, read failures, latency, and how many
/// handles are open.
#[derive(Clone)]
pub struct FakeCamera {
    pub scene: Arc<Mutex<Scene>>,
    pub fail_reads: Arc<AtomicBool>,
    pub open_handles: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
    pub read_delay_ms: Arc<AtomicU64>,
    pub open_delay_ms: Arc<AtomicU64>,
    available: Vec<u32>,
}

impl FakeCamera {
    pub fn new(scene: Scene) -> Self {
        Self::with_devices(scene, vec![0])
    }

    pub fn with_devices(scene: Scene, available: Vec<u32>) -> Self {
        Self {
            scene: Arc::new(Mutex::new(scene)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            open_handles: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
            read_delay_ms: Arc::new(AtomicU64::new(0)),
            open_delay_ms: Arc::new(AtomicU64::new(0)),
            available,
        }
    }

    pub fn set_scene(&self, scene: Scene) {
        *self.scene.lock().unwrap() = scene;
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

struct FakeFrames {
    index: u32,
    camera: FakeCamera,
}

impl FrameSource for FakeFrames {
    fn read_frame(&mut self) -> Result<DynamicImage> {
        self.camera.reads.fetch_add(1, Ordering::SeqCst);
        pause(&self.camera.read_delay_ms);
        if self.camera.fail_reads.load(Ordering::SeqCst) {
            return Err(ProctorError::Camera("device unplugged".into()));
        }
        Ok(render(*self.camera.scene.lock().unwrap()))
    }

    fn device_index(&self) -> u32 {
        self.index
    }
}

impl Drop for FakeFrames {
    fn drop(&mut self) {
        self.camera.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CameraProvider for FakeCamera {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>> {
        if !self.available.contains(&index) {
            return Err(ProctorError::Camera(format!("no /dev/video{}", index)));
        }
        pause(&self.open_delay_ms);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeFrames { index, camera: self.clone() }))
    }
}

fn marker(image: &DynamicImage) -> Rgb<u8> {
    *image.to_rgb8().get_pixel(0, 0)
}

/// Reports as many faces as the scene says.
pub struct FakeDetector;

impl FaceDetection for FakeDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let faces = marker(image)[0];
        Ok((0..faces)
            .map(|i| {
                let x = 8.0 + i as f32 * 24.0;
                FaceBox { x1: x, y1: 8.0, x2: x + 20.0, y2: 40.0, confidence: 0.95 }
            })
            .collect())
    }
}

/// Embeds the identity bytes of the scene.
pub struct FakeEmbedder;

impl FaceEmbedding for FakeEmbedder {
    fn embed(&self, image: &DynamicImage, _face: &FaceBox) -> Result<Vec<f32>> {
        let pixel = marker(image);
        Ok(signature_of([pixel[1], pixel[2]]))
    }
}

pub struct FixedAffect(pub &'static str);

impl AffectClassification for FixedAffect {
    fn classify(&self, _face: &DynamicImage) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub struct FailingAffect;

impl AffectClassification for FailingAffect {
    fn classify(&self, _face: &DynamicImage) -> Result<String> {
        Err(ProctorError::Model("emotion model crashed".into()))
    }
}

pub struct PanickingAffect;

impl AffectClassification for PanickingAffect {
    fn classify(&self, _face: &DynamicImage) -> Result<String> {
        panic!("emotion model segfault");
    }
}

/// Sees a phone when the scene has one.
pub struct FakeObjects;

impl ObjectDetection for FakeObjects {
    fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>> {
        if image.to_rgb8().get_pixel(1, 0)[0] == 0 {
            return Ok(Vec::new());
        }
        let bbox = FaceBox { x1: 40.0, y1: 40.0, x2: 60.0, y2: 60.0, confidence: 0.9 };
        Ok(vec![
            DetectedObject { label: "cell phone".into(), bbox: bbox.clone() },
            DetectedObject { label: "cell phone".into(), bbox },
        ])
    }
}

pub fn matcher() -> Arc<IdentityMatcher> {
    Arc::new(IdentityMatcher::new(Arc::new(FakeDetector), Arc::new(FakeEmbedder), MatcherConfig::default()))
}

pub fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig {
        frame_interval_ms: 20,
        max_consecutive_read_failures: 3,
        ..MonitorConfig::default()
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<FileSignatureStore>,
    pub camera: FakeCamera,
}

impl Fixture {
    /// Exam 1 enrolls alice and bob.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(FileSignatureStore::new(dir.path().join("signatures")).expect("store"));
        store
            .save_signature_set(1, &[
                FacialSignature::new("alice", signature_of(ALICE)),
                FacialSignature::new("bob", signature_of(BOB)),
            ])
            .expect("seed signatures");

        Self { dir, store, camera: FakeCamera::new(Scene::student(ALICE)) }
    }

    pub fn context(&self) -> MonitorContext {
        self.context_with(fast_monitor_config())
    }

    pub fn context_with(&self, config: MonitorConfig) -> MonitorContext {
        MonitorContext::new(Arc::new(self.camera.clone()), self.store.clone(), matcher(), config)
            .with_camera_indices(vec![2, 1, 0])
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
