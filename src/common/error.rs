use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No signatures recorded for exam {0}")]
    SignaturesNotFound(crate::common::ExamId),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Guard error: {0}")]
    Guard(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ProctorError>;
