//! Single-frame identity decision against one reference signature.
//!
//! The matcher never auto-selects among several faces: more than one face
//! in the frame is reported as [`MatchStatus::MultipleFaces`].

use crate::common::config::{DistanceMetric, MatcherConfig};
use crate::core::detector::{FaceBox, FaceDetection};
use crate::core::recognizer::{cosine_similarity, euclidean_distance, FaceEmbedding};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Confirmed,
    Mismatch,
    NoFace,
    MultipleFaces,
    ErrorAnalysis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub status: MatchStatus,
    /// Distance to the reference, present when exactly one face was embedded.
    pub distance: Option<f32>,
    /// The face that was compared.
    pub face: Option<FaceBox>,
}

impl MatchResult {
    fn bare(status: MatchStatus) -> Self {
        Self { status, distance: None, face: None }
    }

    /// Maps the distance into [0, 1], 1 meaning identical vectors.
    pub fn confidence(&self) -> Option<f32> {
        self.distance.map(|d| (1.0 - d).clamp(0.0, 1.0))
    }
}

pub struct IdentityMatcher {
    detector: Arc<dyn FaceDetection>,
    embedder: Arc<dyn FaceEmbedding>,
    config: MatcherConfig,
}

impl IdentityMatcher {
    pub fn new(
        detector: Arc<dyn FaceDetection>,
        embedder: Arc<dyn FaceEmbedding>,
        config: MatcherConfig,
    ) -> Self {
        Self { detector, embedder, config }
    }

    pub fn match_frame(&self, frame: &DynamicImage, reference: &[f32]) -> MatchResult {
        let faces = match self.detector.detect(frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::debug!("Face detection failed: {}", e);
                return MatchResult::bare(MatchStatus::ErrorAnalysis);
            }
        };

        let face = match faces.as_slice() {
            [] => return MatchResult::bare(MatchStatus::NoFace),
            [face] => face.clone(),
            _ => return MatchResult::bare(MatchStatus::MultipleFaces),
        };

        let embedding = match self.embedder.embed(frame, &face) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::debug!("Face embedding failed: {}", e);
                return MatchResult { status: MatchStatus::ErrorAnalysis, distance: None, face: Some(face) };
            }
        };

        let distance = match signature_distance(&embedding, reference, self.config.metric) {
            Some(distance) => distance,
            None => {
                tracing::warn!(
                    "Embedding dimension {} does not match signature dimension {}",
                    embedding.len(),
                    reference.len()
                );
                return MatchResult { status: MatchStatus::ErrorAnalysis, distance: None, face: Some(face) };
            }
        };

        let status = if distance < self.config.distance_threshold {
            MatchStatus::Confirmed
        } else {
            MatchStatus::Mismatch
        };

        MatchResult { status, distance: Some(distance), face: Some(face) }
    }
}

/// `None` when the vectors are empty or of different dimension.
pub fn signature_distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let distance = match metric {
        DistanceMetric::Euclidean => euclidean_distance(a, b),
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
    };

    distance.is_finite().then_some(distance)
}
