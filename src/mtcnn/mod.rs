pub mod bbox;
pub mod config;
pub mod detector;
pub mod face_info;
pub mod found_face;
pub mod network;
pub mod nms;
pub mod preprocess;
pub mod proposal;
pub mod refine;

pub use config::{DetectorConfig, ModelConfig};
pub use detector::{MtcnnDetector, Stage};
pub use face_info::{FaceBox, FaceInfo};
pub use found_face::FoundFace;
pub use network::{Network, OrtNetwork};
pub use nms::NmsMethod;
