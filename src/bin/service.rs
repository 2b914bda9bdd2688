use anyhow::Context as _;
use clap::Parser;
use exam_proctor::{
    camera::V4l2CameraProvider,
    common::config::MonitorMode,
    core::{EmotionClassifier, FaceDetector, FaceRecognizer, IdentityMatcher, ObjectDetector},
    enrollment::SignatureExtractor,
    guards::{GuardSet, LoggingOverlay},
    monitor::{MonitorContext, MonitorRegistry},
    service::{ProctorServer, ProctorService},
    storage::FileSignatureStore,
    Config, DevMode,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "exam-proctord")]
#[command(about = "Exam session proctoring daemon")]
struct Args {
    /// Run in development mode (./dev_data, ./models, /tmp socket)
    #[arg(long)]
    dev: bool,

    /// Override the socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Override the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory in dev mode
    #[arg(long, default_value = "./dev_data")]
    dev_data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting exam-proctord (dev_mode: {})", args.dev);

    let dev_mode = DevMode::with_base_dir(args.dev, args.dev_data_dir.clone())?;
    let config_path = args.config.clone().unwrap_or_else(|| dev_mode.config_file());
    let config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let models_dir = dev_mode.models_dir();
    let optimization_level = config.performance.optimization_level;

    let detector = Arc::new(
        FaceDetector::new(
            &config.detector,
            &config.models.resolve(&config.models.detector_path, &models_dir),
            optimization_level,
        )
        .context("Failed to load face detector")?,
    );
    let recognizer = Arc::new(
        FaceRecognizer::new(
            &config.recognizer,
            &config.models.resolve(&config.models.recognizer_path, &models_dir),
            optimization_level,
        )
        .context("Failed to load face recognizer")?,
    );
    let matcher = Arc::new(IdentityMatcher::new(detector.clone(), recognizer.clone(), config.matcher.clone()));

    let signatures_dir = config
        .storage
        .signatures_dir
        .clone()
        .unwrap_or_else(|| dev_mode.signatures_dir());
    let store = Arc::new(FileSignatureStore::new(&signatures_dir)?);

    let mut context = MonitorContext::new(
        Arc::new(V4l2CameraProvider::new(&config.camera)),
        store.clone(),
        matcher,
        config.monitor.clone(),
    )
    .with_camera_indices(config.camera.device_indices.clone())
    .with_input_lock(Arc::new(LoggingOverlay::new()));

    if let Some(path) = &config.models.affect_path {
        match EmotionClassifier::new(&config.models.resolve(path, &models_dir), optimization_level) {
            Ok(classifier) => context = context.with_affect(Arc::new(classifier)),
            Err(e) => tracing::warn!("Emotion analysis disabled: {}", e),
        }
    }

    if config.monitor.mode == MonitorMode::FacePlusObjectDetection {
        let path = config
            .models
            .object_detector_path
            .as_ref()
            .context("face_plus_object_detection requires models.object_detector_path")?;
        let objects = ObjectDetector::new(
            &config.detector,
            &config.models.resolve(path, &models_dir),
            optimization_level,
            &config.monitor.forbidden_objects,
            config.monitor.object_confidence,
        )
        .context("Failed to load object detector")?;
        context = context.with_objects(Arc::new(objects));
    }

    let registry = Arc::new(MonitorRegistry::new(context));

    let guards = Arc::new(GuardSet::from_config(&config.guards, |_| Arc::new(LoggingOverlay::new())));
    guards.start_all();
    tracing::info!("{} guards running", guards.len());

    let extractor = Arc::new(SignatureExtractor::new(detector, recognizer, store.clone()));
    let uploads_dir = config
        .storage
        .uploads_dir
        .clone()
        .unwrap_or_else(|| dev_mode.uploads_dir());

    let service = Arc::new(
        ProctorService::new(registry.clone(), store, guards.clone())
            .with_extractor(extractor)
            .with_uploads_dir(uploads_dir),
    );

    let socket_path = args.socket.unwrap_or_else(|| dev_mode.socket_path());
    let server = ProctorServer::bind(&socket_path, service)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

    let served = server.serve();

    registry.shutdown();
    guards.stop_all();
    served?;

    Ok(())
}
