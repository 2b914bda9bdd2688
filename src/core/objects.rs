use crate::common::{ProctorError, Result};
use crate::common::config::DetectorConfig;
use crate::core::detector::{non_max_suppression, FaceBox, YoloOutput};
use crate::core::runtime::load_session;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub bbox: FaceBox,
}

/// Finds forbidden objects (phones, second screens, ...) in a frame.
pub trait ObjectDetection: Send + Sync {
    fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>>;
}

pub struct ObjectDetector {
    session: Session,
    _environment: Arc<Environment>,
    input: DetectorConfig,
    targets: Vec<String>,
    min_confidence: f32,
}

impl ObjectDetector {
    /// `targets` are COCO class names; everything else is ignored.
    pub fn new(
        input: &DetectorConfig,
        model_path: &Path,
        optimization_level: u32,
        targets: &[String],
        min_confidence: f32,
    ) -> Result<Self> {
        let (session, environment) = load_session("object_detector", model_path, optimization_level)?;

        for target in targets {
            if !COCO_CLASSES.contains(&target.as_str()) {
                tracing::warn!("Forbidden object '{}' is not a COCO class and will never match", target);
            }
        }

        Ok(Self {
            session,
            _environment: environment,
            input: input.clone(),
            targets: targets.to_vec(),
            min_confidence,
        })
    }
}

impl ObjectDetection for ObjectDetector {
    fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>> {
        let resized = image.resize_exact(self.input.input_width, self.input.input_height, FilterType::Nearest);
        let rgb = resized.to_rgb8();
        let (w, h) = (rgb.width() as usize, rgb.height() as usize);

        let mut array = Array4::<f32>::zeros((1, 3, h, w));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                array[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        let cow_array = CowArray::from(array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let output = outputs
            .first()
            .ok_or_else(|| ProctorError::Model("Object detector produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned();
        let data = output
            .as_slice()
            .ok_or_else(|| ProctorError::Model("Object detector output is not contiguous".into()))?;
        let yolo = YoloOutput::new(data, output.shape()).ok_or_else(|| {
            ProctorError::Model(format!("Unexpected object detector output shape: {:?}", output.shape()))
        })?;

        let mut objects = parse_object_predictions(&yolo, &self.input, &self.targets, self.min_confidence);

        let scale_x = image.width() as f32 / self.input.input_width as f32;
        let scale_y = image.height() as f32 / self.input.input_height as f32;
        for object in &mut objects {
            object.bbox.x1 *= scale_x;
            object.bbox.x2 *= scale_x;
            object.bbox.y1 *= scale_y;
            object.bbox.y2 *= scale_y;
        }

        Ok(objects)
    }
}

/// Each prediction is `[cx, cy, w, h, score_0 .. score_79]`.
pub(crate) fn parse_object_predictions(
    output: &YoloOutput<'_>,
    input: &DetectorConfig,
    targets: &[String],
    min_confidence: f32,
) -> Vec<DetectedObject> {
    let class_count = output.fields().saturating_sub(4).min(COCO_CLASSES.len());
    let mut per_class: Vec<Vec<FaceBox>> = vec![Vec::new(); class_count];

    for i in 0..output.len() {
        let best = (0..class_count)
            .map(|c| (c, output.value(i, 4 + c)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let (class_id, score) = match best {
            Some(best) if best.1 >= min_confidence => best,
            _ => continue,
        };
        if !targets.iter().any(|t| t == COCO_CLASSES[class_id]) {
            continue;
        }

        let (x1, y1, x2, y2) = output.corners(i, input.input_width as f32, input.input_height as f32);
        per_class[class_id].push(FaceBox { x1, y1, x2, y2, confidence: score });
    }

    per_class
        .into_iter()
        .enumerate()
        .flat_map(|(class_id, boxes)| {
            non_max_suppression(boxes, input.nms_iou_threshold)
                .into_iter()
                .map(move |bbox| DetectedObject { label: COCO_CLASSES[class_id].to_string(), bbox })
        })
        .collect()
}
