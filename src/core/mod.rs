pub mod affect;
pub mod detector;
pub mod matcher;
pub mod objects;
pub mod recognizer;
mod runtime;

pub use affect::{AffectClassification, EmotionClassifier};
pub use detector::{FaceDetector, FaceBox, FaceDetection};
pub use matcher::{IdentityMatcher, MatchResult, MatchStatus};
pub use objects::{DetectedObject, ObjectDetection, ObjectDetector};
pub use recognizer::{FaceRecognizer, FaceEmbedding, cosine_similarity, euclidean_distance, crop_face, Embedding};
