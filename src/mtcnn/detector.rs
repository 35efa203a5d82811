use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bbox::{pad, pad_square, regress};
use super::config::{check_thresholds, DetectorConfig, ModelConfig};
use super::face_info::FaceInfo;
use super::network::{Network, OrtNetwork};
use super::nms::{nms, NmsMethod};
use super::proposal::proposal_net;
use super::refine::{next_stage, RefineStage};
use crate::error::{DetectError, Result};

/// Stage-1 output is truncated to this many candidates before refinement.
pub const PNET_MAX_DETECT_NUM: usize = 5000;
/// Largest batch sent to the refine and output networks in one call.
pub const STEP_SIZE: usize = 128;

const STAGE_NMS_THRESHOLD: f32 = 0.4;

/// Last cascade stage to run; its output is what detection returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Proposal = 1,
    Refine = 2,
    Output = 3,
}

impl TryFrom<u8> for Stage {
    type Error = DetectError;

    fn try_from(value: u8) -> Result<Stage> {
        match value {
            1 => Ok(Stage::Proposal),
            2 => Ok(Stage::Refine),
            3 => Ok(Stage::Output),
            _ => Err(DetectError::InvalidArgument(format!("stage must be 1, 2 or 3, got {value}"))),
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage as u8
    }
}

/// Runs `faces` through a refinement stage `STEP_SIZE` at a time and
/// concatenates the survivors in chunk order.
fn refine_in_chunks(net: &mut dyn Network, image: &RgbImage, faces: &[FaceInfo], stage: RefineStage, threshold: f32) -> Result<Vec<FaceInfo>> {
    let mut res = vec![];
    for chunk in faces.chunks(STEP_SIZE) {
        res.extend(next_stage(net, image, chunk, stage, threshold)?);
    }
    Ok(res)
}

pub struct MtcnnDetector<N: Network = OrtNetwork> {
    pnet: N,
    rnet: N,
    onet: N,
}

impl MtcnnDetector<OrtNetwork> {
    pub fn from_models(models: &ModelConfig) -> Result<MtcnnDetector<OrtNetwork>> {
        let now = Instant::now();
        let detector = MtcnnDetector::new(
            OrtNetwork::from_file(&models.pnet, models.intra_threads)?,
            OrtNetwork::from_file(&models.rnet, models.intra_threads)?,
            OrtNetwork::from_file(&models.onet, models.intra_threads)?,
        );
        info!("Loaded cascade in {:?}", now.elapsed());
        Ok(detector)
    }
}

impl<N: Network> MtcnnDetector<N> {
    pub fn new(pnet: N, rnet: N, onet: N) -> MtcnnDetector<N> {
        MtcnnDetector { pnet, rnet, onet }
    }

    pub fn detect_with(&mut self, image: &RgbImage, config: &DetectorConfig) -> Result<Vec<FaceInfo>> {
        self.detect(image, config.min_size, &config.thresholds, config.factor, config.stage)
    }

    /// Detects faces, running the cascade up to `stage`.
    ///
    /// `thresholds` holds one score threshold per stage. Stages after an
    /// empty result are skipped and the output of `stage` is returned.
    pub fn detect(&mut self, image: &RgbImage, min_size: u32, thresholds: &[f32], factor: f64, stage: Stage) -> Result<Vec<FaceInfo>> {
        let threshold = check_thresholds(thresholds)?;
        let (width, height) = image.dimensions();
        let now = Instant::now();

        let mut pnet_res = proposal_net(&mut self.pnet, image, min_size, threshold[0], factor)?;
        debug!("pnet: {} boxes", pnet_res.len());
        if stage == Stage::Proposal {
            return Ok(pnet_res);
        }

        let mut rnet_res = vec![];
        if !pnet_res.is_empty() {
            pnet_res.truncate(PNET_MAX_DETECT_NUM);
            rnet_res = refine_in_chunks(&mut self.rnet, image, &pnet_res, RefineStage::Refine, threshold[1])?;
            rnet_res = nms(rnet_res, STAGE_NMS_THRESHOLD, NmsMethod::Min);
            regress(&mut rnet_res);
            pad_square(&mut rnet_res, width, height);
        }
        debug!("rnet: {} boxes", rnet_res.len());
        if stage == Stage::Refine {
            return Ok(rnet_res);
        }

        let mut onet_res = vec![];
        if !rnet_res.is_empty() {
            onet_res = refine_in_chunks(&mut self.onet, image, &rnet_res, RefineStage::Output, threshold[2])?;
            regress(&mut onet_res);
            onet_res = nms(onet_res, STAGE_NMS_THRESHOLD, NmsMethod::Min);
            pad(&mut onet_res, width, height);
        }
        debug!("onet: {} boxes, detection took {:?}", onet_res.len(), now.elapsed());
        Ok(onet_res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtcnn::FaceBox;
    use ndarray::{Array4, ArrayD};

    /// Numbers every item it scores by its position across all calls and
    /// rejects every third item of a batch.
    struct Counting {
        seen: usize,
        batches: Vec<usize>,
    }

    impl Network for Counting {
        fn forward(&mut self, input: Array4<f32>, _input_name: &str, _output_names: &[&str]) -> Result<Vec<ArrayD<f32>>> {
            let n = input.shape()[0];
            let mut reg = ArrayD::<f32>::zeros(vec![n, 4]);
            let mut prob = ArrayD::<f32>::zeros(vec![n, 2]);
            for k in 0..n {
                reg[[k, 0]] = (self.seen + k) as f32;
                prob[[k, 1]] = if k % 3 == 2 { 0.1 } else { 0.9 };
            }
            self.seen += n;
            self.batches.push(n);
            Ok(vec![reg, prob])
        }
    }

    #[test]
    fn chunks_are_concatenated_in_order() {
        let faces = (0..300)
            .map(|i| FaceInfo::new(FaceBox::new(i as f32, 0.0, i as f32 + 11.0, 11.0, 0.5)))
            .collect::<Vec<_>>();
        let mut net = Counting { seen: 0, batches: vec![] };
        let image = RgbImage::new(32, 32);
        let res = refine_in_chunks(&mut net, &image, &faces, RefineStage::Refine, 0.5).unwrap();

        assert_eq!(net.batches, vec![128, 128, 44]);
        let expected = (0..300).filter(|i| (i % STEP_SIZE) % 3 != 2).collect::<Vec<_>>();
        assert_eq!(res.len(), expected.len());
        for (info, &i) in res.iter().zip(&expected) {
            assert_eq!(info.bbox.xmin, i as f32);
            assert_eq!(info.bbox_reg[0], i as f32);
        }
    }

    #[test]
    fn stage_from_integer() {
        assert_eq!(Stage::try_from(1).unwrap(), Stage::Proposal);
        assert_eq!(Stage::try_from(3).unwrap(), Stage::Output);
        assert!(Stage::try_from(0).is_err());
        assert!(Stage::try_from(4).is_err());
        assert_eq!(u8::from(Stage::Refine), 2);
        assert!(Stage::Proposal < Stage::Output);
    }

    #[test]
    fn stage_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Stage::Refine).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Stage>("1").unwrap(), Stage::Proposal);
    }
}
