use crate::common::{ProctorError, Result};
use crate::common::config::DetectorConfig;
use crate::core::runtime::load_session;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.x1 *= sx;
        self.x2 *= sx;
        self.y1 *= sy;
        self.y2 *= sy;
    }
}

/// Anything that can find faces in a frame.
pub trait FaceDetection: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// YOLOv8-style single-class face detector.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new(config: &DetectorConfig, model_path: &Path, optimization_level: u32) -> Result<Self> {
        let (session, environment) = load_session("face_detector", model_path, optimization_level)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }
}

impl FaceDetection for FaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ProctorError::Model("Cannot run detection on an empty frame".into()));
        }

        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width
            && image.height() == self.config.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.input_width,
                self.config.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let output = outputs
            .first()
            .ok_or_else(|| ProctorError::Model("Detector produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned();
        let data = output
            .as_slice()
            .ok_or_else(|| ProctorError::Model("Detector output is not contiguous".into()))?;

        let yolo = match YoloOutput::new(data, output.shape()) {
            Some(yolo) => yolo,
            None => {
                tracing::warn!("Unexpected detector output shape: {:?}", output.shape());
                return Ok(Vec::new());
            }
        };

        let mut faces = parse_face_predictions(&yolo, &self.config);

        // Back to original image coordinates
        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;
        for face in &mut faces {
            face.scale(scale_x, scale_y);
        }

        Ok(faces)
    }
}

/// View over a YOLOv8 output tensor, either `[1, N, F]` or transposed `[1, F, N]`.
pub(crate) struct YoloOutput<'a> {
    data: &'a [f32],
    num_predictions: usize,
    prediction_length: usize,
    transposed: bool,
}

impl<'a> YoloOutput<'a> {
    pub(crate) fn new(data: &'a [f32], shape: &[usize]) -> Option<Self> {
        let (num_predictions, prediction_length, transposed) = match shape.len() {
            3 if shape[2] > shape[1] => (shape[2], shape[1], true),
            3 => (shape[1], shape[2], false),
            2 => (shape[0], shape[1], false),
            _ => return None,
        };

        if prediction_length < 4 || data.len() < num_predictions * prediction_length {
            return None;
        }

        Some(Self { data, num_predictions, prediction_length, transposed })
    }

    pub(crate) fn len(&self) -> usize {
        self.num_predictions
    }

    pub(crate) fn fields(&self) -> usize {
        self.prediction_length
    }

    pub(crate) fn value(&self, prediction: usize, field: usize) -> f32 {
        if self.transposed {
            self.data[field * self.num_predictions + prediction]
        } else {
            self.data[prediction * self.prediction_length + field]
        }
    }

    /// Center-format box of one prediction converted to corners in model input space.
    pub(crate) fn corners(&self, prediction: usize, input_width: f32, input_height: f32) -> (f32, f32, f32, f32) {
        let cx = self.value(prediction, 0);
        let cy = self.value(prediction, 1);
        let w = self.value(prediction, 2);
        let h = self.value(prediction, 3);

        // Some exports emit normalized coordinates
        let (sx, sy) = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 {
            (1.0, 1.0)
        } else {
            (input_width, input_height)
        };

        let (cx, cy, w, h) = (cx * sx, cy * sy, w * sx, h * sy);
        (
            (cx - w / 2.0).max(0.0),
            (cy - h / 2.0).max(0.0),
            (cx + w / 2.0).min(input_width),
            (cy + h / 2.0).min(input_height),
        )
    }
}

pub(crate) fn parse_face_predictions(output: &YoloOutput<'_>, config: &DetectorConfig) -> Vec<FaceBox> {
    let input_width = config.input_width as f32;
    let input_height = config.input_height as f32;
    let mut faces = Vec::new();

    for i in 0..output.len() {
        let confidence = if output.fields() > 4 { output.value(i, 4) } else { 0.0 };
        // Very low floor so NMS sees every real candidate
        if confidence <= 0.001 {
            continue;
        }

        let (x1, y1, x2, y2) = output.corners(i, input_width, input_height);
        if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    // NMS first, then the real threshold, so duplicates don't survive as separate faces
    let mut faces = non_max_suppression(faces, config.nms_iou_threshold);
    faces.retain(|face| face.confidence >= config.confidence_threshold);
    faces.truncate(5);
    faces
}

/// Greedy NMS; the result is sorted by descending confidence.
pub(crate) fn non_max_suppression(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| kept.iou(&candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
