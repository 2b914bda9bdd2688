use crate::common::{ProctorError, Result};
use crate::common::config::RecognizerConfig;
use crate::core::detector::FaceBox;
use crate::core::runtime::load_session;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

pub type Embedding = Vec<f32>;

/// Turns one detected face into a feature vector.
pub trait FaceEmbedding: Send + Sync {
    fn embed(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding>;
}

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    config: RecognizerConfig,
}

impl FaceRecognizer {
    pub fn new(config: &RecognizerConfig, model_path: &Path, optimization_level: u32) -> Result<Self> {
        let (session, environment) = load_session("face_recognizer", model_path, optimization_level)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let size = self.config.input_size as usize;
        let norm_val = self.config.normalization_value;

        if self.config.channels == 1 {
            let gray = img.to_luma8();
            let mut array = Array4::<f32>::zeros((1, 1, size, size));
            for (x, y, pixel) in gray.enumerate_pixels() {
                array[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 - norm_val) / norm_val;
            }
            array
        } else {
            let rgb = img.to_rgb8();
            let mut array = Array4::<f32>::zeros((1, 3, size, size));
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    array[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm_val) / norm_val;
                }
            }
            array
        }
    }
}

impl FaceEmbedding for FaceRecognizer {
    fn embed(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding> {
        let face_img = crop_face(image, face)?;

        let resized = face_img.resize_exact(
            self.config.input_size,
            self.config.input_size,
            FilterType::Triangle,
        );

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;

        let embedding = outputs
            .first()
            .ok_or_else(|| ProctorError::Model("Recognizer produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_raw_vec();

        if embedding.len() != self.config.embedding_size {
            return Err(ProctorError::Model(format!(
                "Expected a {}-D embedding, model produced {}",
                self.config.embedding_size,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

/// Crops a face box out of a frame, clamped to the frame bounds.
pub fn crop_face(image: &DynamicImage, face: &FaceBox) -> Result<DynamicImage> {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    if x >= image.width() || y >= image.height() {
        return Err(ProctorError::Model(format!(
            "Face box ({}, {}) lies outside the {}x{} frame", x, y, image.width(), image.height()
        )));
    }

    let width = (face.width().max(1.0) as u32).min(image.width() - x);
    let height = (face.height().max(1.0) as u32).min(image.height() - y);

    Ok(image.crop_imm(x, y, width.max(1), height.max(1)))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
