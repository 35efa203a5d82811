use std::env;
use std::path::PathBuf;

pub mod error;
pub mod mtcnn;

pub use error::{DetectError, Result};

/// Directory holding `det1.onnx`, `det2.onnx` and `det3.onnx`.
pub fn model_dir() -> PathBuf {
    match env::var("MTCNN_MODEL_DIR") {
        Ok(str) => { PathBuf::from(str) }
        Err(_) => { PathBuf::from("model") }
    }
}
