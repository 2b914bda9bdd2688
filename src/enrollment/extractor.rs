use crate::common::{ExamId, Result};
use crate::core::{FaceDetection, FaceEmbedding};
use crate::storage::{normalize_label, FacialSignature, SignatureStore};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct UploadedImage {
    pub file_name: String,
    /// Normalized filename stem.
    pub label: String,
    pub image: DynamicImage,
}

#[derive(Default)]
pub struct UploadScan {
    pub images: Vec<UploadedImage>,
    /// Image files that could not be decoded.
    pub unreadable: Vec<String>,
}

/// Decodes every image file in `folder`, in filename order. Non-image files are skipped.
pub fn enumerate_uploaded_images(folder: &Path) -> Result<UploadScan> {
    let mut entries: Vec<_> = fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut scan = UploadScan::default();
    for path in entries {
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

        match image::open(&path) {
            Ok(image) => scan.images.push(UploadedImage { file_name, label: normalize_label(&stem), image }),
            Err(e) => {
                tracing::warn!("Could not decode {}: {}", path.display(), e);
                scan.unreadable.push(file_name);
            }
        }
    }

    Ok(scan)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub processed_count: usize,
    pub failed_files: Vec<String>,
}

/// Builds an exam's roster from a folder of student photos named after the student.
pub struct SignatureExtractor {
    detector: Arc<dyn FaceDetection>,
    embedder: Arc<dyn FaceEmbedding>,
    store: Arc<dyn SignatureStore>,
}

impl SignatureExtractor {
    pub fn new(
        detector: Arc<dyn FaceDetection>,
        embedder: Arc<dyn FaceEmbedding>,
        store: Arc<dyn SignatureStore>,
    ) -> Self {
        Self { detector, embedder, store }
    }

    pub fn extract_signatures(&self, exam_id: ExamId, images_folder: &Path) -> ExtractionReport {
        let scan = match enumerate_uploaded_images(images_folder) {
            Ok(scan) => scan,
            Err(e) => {
                tracing::error!("Cannot read upload folder {}: {}", images_folder.display(), e);
                return ExtractionReport::default();
            }
        };

        let mut failed_files = scan.unreadable;
        let mut signatures = Vec::with_capacity(scan.images.len());
        let total = scan.images.len();

        for (i, upload) in scan.images.into_iter().enumerate() {
            match self.signature_for(&upload) {
                Some(signature) => signatures.push(signature),
                None => failed_files.push(upload.file_name),
            }
            tracing::debug!("Extraction progress {}/{}", i + 1, total);
        }

        let processed_count = signatures.len();
        if processed_count == 0 {
            tracing::warn!("No usable face found for exam {} in {}", exam_id, images_folder.display());
            return ExtractionReport { success: false, processed_count, failed_files };
        }

        let success = match self.store.save_signature_set(exam_id, &signatures) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save signatures for exam {}: {}", exam_id, e);
                false
            }
        };

        tracing::info!(
            "Extracted {} signatures for exam {} ({} failed)",
            processed_count,
            exam_id,
            failed_files.len()
        );
        ExtractionReport { success, processed_count, failed_files }
    }

    fn signature_for(&self, upload: &UploadedImage) -> Option<FacialSignature> {
        let faces = match self.detector.detect(&upload.image) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!("Face detection failed on {}: {}", upload.file_name, e);
                return None;
            }
        };

        let face = match faces.as_slice() {
            [face] => face,
            [] => {
                tracing::warn!("No face in {}", upload.file_name);
                return None;
            }
            _ => {
                tracing::warn!("{} faces in {}, expected one", faces.len(), upload.file_name);
                return None;
            }
        };

        match self.embedder.embed(&upload.image, face) {
            Ok(vector) => Some(FacialSignature::new(upload.label.clone(), vector)),
            Err(e) => {
                tracing::warn!("Embedding failed on {}: {}", upload.file_name, e);
                None
            }
        }
    }
}
