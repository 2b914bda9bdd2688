use crate::common::{ProctorError, Result};
use crate::core::runtime::load_session;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

/// FER+ output order.
pub const EMOTION_LABELS: [&str; 8] = [
    "neutral", "happiness", "surprise", "sadness", "anger", "disgust", "fear", "contempt",
];

const INPUT_SIZE: u32 = 64;

/// Classifies the dominant emotion of a cropped face.
pub trait AffectClassification: Send + Sync {
    fn classify(&self, face: &DynamicImage) -> Result<String>;
}

pub struct EmotionClassifier {
    session: Session,
    _environment: Arc<Environment>,
}

impl EmotionClassifier {
    pub fn new(model_path: &Path, optimization_level: u32) -> Result<Self> {
        let (session, environment) = load_session("emotion_classifier", model_path, optimization_level)?;
        Ok(Self { session, _environment: environment })
    }
}

impl AffectClassification for EmotionClassifier {
    fn classify(&self, face: &DynamicImage) -> Result<String> {
        let gray = face
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_luma8();

        // FER+ takes raw 0-255 intensities
        let size = INPUT_SIZE as usize;
        let mut array = Array4::<f32>::zeros((1, 1, size, size));
        for (x, y, pixel) in gray.enumerate_pixels() {
            array[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
        }

        let cow_array = CowArray::from(array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let scores = outputs
            .first()
            .ok_or_else(|| ProctorError::Model("Emotion classifier produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_raw_vec();

        dominant_emotion(&scores)
            .map(str::to_string)
            .ok_or_else(|| ProctorError::Model(format!(
                "Expected {} emotion scores, got {}", EMOTION_LABELS.len(), scores.len()
            )))
    }
}

fn dominant_emotion(scores: &[f32]) -> Option<&'static str> {
    if scores.len() != EMOTION_LABELS.len() {
        return None;
    }

    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| EMOTION_LABELS[i])
}
