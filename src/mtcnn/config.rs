use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::detector::Stage;
use crate::error::{DetectError, Result};

pub(crate) fn check_min_size(min_size: u32) -> Result<()> {
    if min_size == 0 {
        return Err(DetectError::InvalidArgument("min_size must be > 0".to_string()));
    }
    Ok(())
}

pub(crate) fn check_factor(factor: f64) -> Result<()> {
    if !(factor.is_finite() && factor > 0.0 && factor < 1.0) {
        return Err(DetectError::InvalidArgument(format!("factor must be in (0, 1), got {factor}")));
    }
    Ok(())
}

pub(crate) fn check_thresholds(thresholds: &[f32]) -> Result<[f32; 3]> {
    let thresholds: [f32; 3] = thresholds.try_into().map_err(|_| {
        DetectError::InvalidArgument(format!("expected 3 thresholds, got {}", thresholds.len()))
    })?;
    if let Some(bad) = thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
        return Err(DetectError::InvalidArgument(format!("thresholds must be in [0, 1], got {bad}")));
    }
    Ok(thresholds)
}

/// Detection parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest face side, in pixels, the pyramid is built for.
    pub min_size: u32,
    /// Score thresholds of the proposal, refine and output stages.
    pub thresholds: [f32; 3],
    /// Pyramid decay between consecutive scales.
    pub factor: f64,
    /// Last stage to run.
    pub stage: Stage,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_size: 20,
            thresholds: [0.6, 0.7, 0.7],
            factor: 0.709,
            stage: Stage::Output,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        check_min_size(self.min_size)?;
        check_factor(self.factor)?;
        check_thresholds(&self.thresholds)?;
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<DetectorConfig> {
        let file = File::open(path.as_ref())?;
        let config: DetectorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}

/// Locations of the three cascade models.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub pnet: PathBuf,
    pub rnet: PathBuf,
    pub onet: PathBuf,
    pub intra_threads: usize,
}

impl ModelConfig {
    pub fn from_dir(dir: impl AsRef<Path>) -> ModelConfig {
        let dir = dir.as_ref();
        ModelConfig {
            pnet: dir.join("det1.onnx"),
            rnet: dir.join("det2.onnx"),
            onet: dir.join("det3.onnx"),
            intra_threads: 4,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::from_dir(crate::model_dir())
    }
}
