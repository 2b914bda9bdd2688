pub mod extractor;

pub use extractor::{enumerate_uploaded_images, ExtractionReport, SignatureExtractor, UploadScan, UploadedImage};
