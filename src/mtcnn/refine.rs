use std::time::Instant;

use image::RgbImage;
use ndarray::ArrayD;
use tracing::debug;

use super::face_info::{FaceBox, FaceInfo};
use super::network::{expect_outputs, Network, INPUT_NAME, ONET_OUTPUTS, RNET_OUTPUTS};
use super::preprocess::{blob_from_images, crop_batch};
use crate::error::{DetectError, Result};

const STD_VAL: f32 = 0.0078125;
const MEAN_VAL: f32 = 127.5;

/// Second and third cascade stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineStage {
    /// R-Net, 24x24 input, box regression and score.
    Refine,
    /// O-Net, 48x48 input, box regression, landmarks and score.
    Output,
}

impl RefineStage {
    pub fn input_size(self) -> u32 {
        match self {
            RefineStage::Refine => 24,
            RefineStage::Output => 48,
        }
    }

    fn outputs(self) -> &'static [&'static str] {
        match self {
            RefineStage::Refine => &RNET_OUTPUTS,
            RefineStage::Output => &ONET_OUTPUTS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RefineStage::Refine => "rnet",
            RefineStage::Output => "onet",
        }
    }
}

/// Row-major values of a `[batch, per_item, ..]` output tensor.
fn flat(tensor: &ArrayD<f32>, per_item: usize, batch_size: usize, network: &'static str) -> Result<Vec<f32>> {
    if tensor.len() < per_item * batch_size {
        return Err(DetectError::ShapeMismatch {
            network,
            detail: format!("tensor {:?} holds fewer than {} x {} values", tensor.shape(), batch_size, per_item),
        });
    }
    Ok(tensor.iter().copied().collect())
}

/// Scores a batch of candidates with a refinement network.
///
/// Every candidate region is cropped, resized to the stage input size and
/// sent through `net` in a single forward pass. Candidates scoring at least
/// `threshold` are returned with their box untouched, the predicted
/// regression attached and, for [`RefineStage::Output`], landmarks placed
/// in image coordinates.
pub fn next_stage(net: &mut dyn Network, image: &RgbImage, pre_stage_res: &[FaceInfo], stage: RefineStage, threshold: f32) -> Result<Vec<FaceInfo>> {
    let batch_size = pre_stage_res.len();
    if batch_size == 0 {
        return Ok(vec![]);
    }

    let input_size = stage.input_size();
    let inputs = crop_batch(image, pre_stage_res, input_size, input_size);
    let blob_input = blob_from_images(&inputs, STD_VAL, MEAN_VAL)?;

    let outputs = net.forward(blob_input, INPUT_NAME, stage.outputs())?;
    let post_processing_time = Instant::now();
    let network = stage.label();
    let (reg_box, reg_landmark, confidence) = match stage {
        RefineStage::Refine => {
            let [reg_box, confidence] = expect_outputs::<2>(outputs, network)?;
            (reg_box, None, confidence)
        }
        RefineStage::Output => {
            let [reg_box, reg_landmark, confidence] = expect_outputs::<3>(outputs, network)?;
            (reg_box, Some(reg_landmark), confidence)
        }
    };

    let confidence = flat(&confidence, 2, batch_size, network)?;
    let reg_box = flat(&reg_box, 4, batch_size, network)?;
    let reg_landmark = reg_landmark
        .as_ref()
        .map(|landmark| flat(landmark, 10, batch_size, network))
        .transpose()?;

    let mut res = vec![];
    for (k, (prev, conf)) in pre_stage_res.iter().zip(confidence.iter().skip(1).step_by(2)).enumerate() {
        let score = *conf;
        if !(score >= threshold) {
            continue;
        }
        let bbox = FaceBox { score, ..prev.bbox };
        let mut info = FaceInfo::new(bbox);
        for (i, reg) in info.bbox_reg.iter_mut().enumerate() {
            *reg = reg_box[4 * k + i];
        }

        if let Some(reg_landmark) = &reg_landmark {
            let w = bbox.width();
            let h = bbox.height();
            for i in 0..5 {
                info.landmark[2 * i] = reg_landmark[10 * k + 2 * i] * w + bbox.xmin;
                info.landmark[2 * i + 1] = reg_landmark[10 * k + 2 * i + 1] * h + bbox.ymin;
            }
        }
        res.push(info);
    }
    debug!(
        "{}: {} of {} candidates passed in {:?}",
        network,
        res.len(),
        batch_size,
        post_processing_time.elapsed()
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    /// Returns canned tensors and remembers the input shape it saw.
    struct Canned {
        outputs: Vec<ArrayD<f32>>,
        seen: Vec<Vec<usize>>,
    }

    impl Network for Canned {
        fn forward(&mut self, input: Array4<f32>, input_name: &str, output_names: &[&str]) -> Result<Vec<ArrayD<f32>>> {
            assert_eq!(input_name, INPUT_NAME);
            assert_eq!(output_names.len(), self.outputs.len());
            self.seen.push(input.shape().to_vec());
            Ok(self.outputs.clone())
        }
    }

    fn tensor(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
        ArrayD::from_shape_vec(shape.to_vec(), values).unwrap()
    }

    fn candidates() -> Vec<FaceInfo> {
        vec![
            FaceInfo::new(FaceBox::new(0.0, 0.0, 19.0, 19.0, 0.9)),
            FaceInfo::new(FaceBox::new(10.0, 20.0, 29.0, 59.0, 0.8)),
            FaceInfo::new(FaceBox::new(40.0, 40.0, 59.0, 59.0, 0.7)),
        ]
    }

    #[test]
    fn empty_batch_skips_the_network() {
        let mut net = Canned { outputs: vec![], seen: vec![] };
        let image = RgbImage::new(64, 64);
        let res = next_stage(&mut net, &image, &[], RefineStage::Refine, 0.5).unwrap();
        assert!(res.is_empty());
        assert!(net.seen.is_empty());
    }

    #[test]
    fn refine_filters_and_keeps_boxes() {
        let mut net = Canned {
            outputs: vec![
                tensor(&[3, 4], (0..12).map(|v| v as f32).collect()),
                tensor(&[3, 2], vec![0.9, 0.1, 0.3, 0.7, 0.5, 0.5]),
            ],
            seen: vec![],
        };
        let image = RgbImage::new(64, 64);
        let res = next_stage(&mut net, &image, &candidates(), RefineStage::Refine, 0.5).unwrap();

        assert_eq!(net.seen, vec![vec![3, 3, 24, 24]]);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].bbox, FaceBox::new(10.0, 20.0, 29.0, 59.0, 0.7));
        assert_eq!(res[0].bbox_reg, [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(res[1].bbox.xmin, 40.0);
        assert_eq!(res[1].score(), 0.5);
        assert_eq!(res[1].bbox_reg, [8.0, 9.0, 10.0, 11.0]);
        assert_eq!(res[1].landmark, [0.0; 10]);
    }

    #[test]
    fn output_stage_places_landmarks() {
        let mut landmarks = vec![0.0; 30];
        for i in 0..5 {
            landmarks[10 + 2 * i] = 0.5;
            landmarks[10 + 2 * i + 1] = 0.25;
        }
        let mut net = Canned {
            outputs: vec![
                tensor(&[3, 4], vec![0.0; 12]),
                tensor(&[3, 10], landmarks),
                tensor(&[3, 2, 1, 1], vec![0.9, 0.1, 0.1, 0.9, 0.9, 0.1]),
            ],
            seen: vec![],
        };
        let image = RgbImage::new(64, 64);
        let res = next_stage(&mut net, &image, &candidates(), RefineStage::Output, 0.6).unwrap();

        assert_eq!(net.seen, vec![vec![3, 3, 48, 48]]);
        assert_eq!(res.len(), 1);
        // box (10, 20)-(29, 59): 20 wide, 40 tall
        for i in 0..5 {
            assert_eq!(res[0].landmark[2 * i], 20.0);
            assert_eq!(res[0].landmark[2 * i + 1], 30.0);
        }
    }

    #[test]
    fn nan_score_is_dropped() {
        let mut net = Canned {
            outputs: vec![
                tensor(&[3, 4], vec![0.0; 12]),
                tensor(&[3, 2], vec![0.1, 0.9, f32::NAN, f32::NAN, 0.1, 0.9]),
            ],
            seen: vec![],
        };
        let image = RgbImage::new(64, 64);
        let res = next_stage(&mut net, &image, &candidates(), RefineStage::Refine, 0.5).unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].bbox.xmin, 0.0);
        assert_eq!(res[1].bbox.xmin, 40.0);
    }

    #[test]
    fn short_outputs_are_rejected() {
        let mut net = Canned {
            outputs: vec![tensor(&[1, 4], vec![0.0; 4]), tensor(&[1, 2], vec![0.0, 1.0])],
            seen: vec![],
        };
        let image = RgbImage::new(64, 64);
        let err = next_stage(&mut net, &image, &candidates(), RefineStage::Refine, 0.5).unwrap_err();
        assert!(matches!(err, DetectError::ShapeMismatch { network: "rnet", .. }));
    }
}
