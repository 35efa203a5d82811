use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("network output `{0}` is missing")]
    MissingOutput(String),

    #[error("unexpected tensor shape from {network}: {detail}")]
    ShapeMismatch {
        network: &'static str,
        detail: String,
    },

    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
