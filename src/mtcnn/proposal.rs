use std::time::Instant;

use image::RgbImage;
use ndarray::ArrayD;
use tracing::debug;

use super::bbox::{pad_square, regress};
use super::config::{check_factor, check_min_size};
use super::face_info::{FaceBox, FaceInfo};
use super::network::{expect_outputs, Network, INPUT_NAME, PNET_OUTPUTS};
use super::nms::{nms, NmsMethod};
use super::preprocess::{blob_from_images, resize};
use crate::error::{DetectError, Result};

pub const PNET_STRIDE: usize = 2;
pub const PNET_CELL_SIZE: usize = 12;

const PNET_STD: f32 = 1.0 / 255.0;
const PNET_MEAN: f32 = 0.0;

const SCALE_NMS_THRESHOLD: f32 = 0.5;
const MERGED_NMS_THRESHOLD: f32 = 0.7;

/// Scale factors of the image pyramid, largest first.
///
/// Starts at `12 / min_size` and decays by `factor` while the shorter image
/// side, scaled, is still at least one detector cell.
pub fn pyramid_scales(width: u32, height: u32, min_size: u32, factor: f64) -> Vec<f64> {
    let mut scale = PNET_CELL_SIZE as f64 / f64::from(min_size);
    let mut min_wh = f64::from(width.min(height)) * scale;
    let mut scales = vec![];
    while min_wh >= PNET_CELL_SIZE as f64 {
        scales.push(scale);
        min_wh *= factor;
        scale *= factor;
    }
    scales
}

/// Turns one scale's proposal output into candidates in image coordinates.
///
/// `confidence` is `[1, 2, h, w]` with the face probability on the second
/// plane, `reg_box` is `[1, 4, h, w]`. A cell is kept when its face
/// probability is above `1 - thresh`; NaN never is. Candidates come out in
/// row-major grid order.
pub fn generate_bbox(confidence: &ArrayD<f32>, reg_box: &ArrayD<f32>, scale: f64, thresh: f32) -> Result<Vec<FaceInfo>> {
    let shape = confidence.shape();
    if shape.len() != 4 || shape[1] < 2 || confidence.len() < 2 * shape[2] * shape[3] {
        return Err(DetectError::ShapeMismatch {
            network: "pnet",
            detail: format!("confidence shape {:?}, expected [1, 2, h, w]", shape),
        });
    }
    let (feature_map_h, feature_map_w) = (shape[2], shape[3]);
    let spatial_size = feature_map_h * feature_map_w;
    if reg_box.len() < 4 * spatial_size {
        return Err(DetectError::ShapeMismatch {
            network: "pnet",
            detail: format!("regression shape {:?} does not cover a {}x{} grid", reg_box.shape(), feature_map_h, feature_map_w),
        });
    }

    let confidence = confidence.as_standard_layout();
    let reg_box = reg_box.as_standard_layout();
    let (Some(confidence), Some(reg_box)) = (confidence.as_slice(), reg_box.as_slice()) else {
        return Err(DetectError::ShapeMismatch { network: "pnet", detail: "non-contiguous tensor".to_string() });
    };

    let mut candidates = vec![];
    for i in 0..spatial_size {
        let score = confidence[i + spatial_size];
        if !(score > 1.0 - thresh) {
            continue;
        }
        let y = i / feature_map_w;
        let x = i - feature_map_w * y;

        let to_image = |v: usize| (v as f64 / scale) as f32;
        let bbox = FaceBox::new(
            to_image(x * PNET_STRIDE),
            to_image(y * PNET_STRIDE),
            to_image(x * PNET_STRIDE + PNET_CELL_SIZE - 1),
            to_image(y * PNET_STRIDE + PNET_CELL_SIZE - 1),
            score,
        );
        let bbox_reg = [
            reg_box[i],
            reg_box[i + spatial_size],
            reg_box[i + 2 * spatial_size],
            reg_box[i + 3 * spatial_size],
        ];
        candidates.push(FaceInfo::with_regression(bbox, bbox_reg));
    }
    Ok(candidates)
}

/// First cascade stage: runs the proposal network over the image pyramid.
///
/// Each scale is suppressed on its own and its survivors are put in front
/// of the ones already collected. The merged set is suppressed again,
/// regressed and squared against the image bounds.
pub fn proposal_net(pnet: &mut dyn Network, image: &RgbImage, min_size: u32, threshold: f32, factor: f64) -> Result<Vec<FaceInfo>> {
    check_min_size(min_size)?;
    check_factor(factor)?;

    let (width, height) = image.dimensions();
    let scales = pyramid_scales(width, height, min_size, factor);
    debug!("pyramid scales: {:?}", scales);

    let mut total_boxes: Vec<FaceInfo> = vec![];
    for &scale in &scales {
        let ws = (f64::from(width) * scale).ceil() as u32;
        let hs = (f64::from(height) * scale).ceil() as u32;
        let resized = resize(image, ws, hs);
        let input_blob = blob_from_images(&[resized], PNET_STD, PNET_MEAN)?;

        let [reg, prob] = expect_outputs::<2>(pnet.forward(input_blob, INPUT_NAME, &PNET_OUTPUTS)?, "pnet")?;
        let post_processing_time = Instant::now();
        let candidates = generate_bbox(&prob, &reg, scale, threshold)?;
        let candidate_count = candidates.len();
        let bboxes_nms = nms(candidates, SCALE_NMS_THRESHOLD, NmsMethod::Union);
        debug!(
            "scale {:.4} ({}x{}): {} candidates, {} after nms in {:?}",
            scale,
            ws,
            hs,
            candidate_count,
            bboxes_nms.len(),
            post_processing_time.elapsed()
        );

        if !bboxes_nms.is_empty() {
            let mut merged = bboxes_nms;
            merged.append(&mut total_boxes);
            total_boxes = merged;
        }
    }

    if total_boxes.is_empty() {
        return Ok(total_boxes);
    }
    let mut res_boxes = nms(total_boxes, MERGED_NMS_THRESHOLD, NmsMethod::Union);
    regress(&mut res_boxes);
    pad_square(&mut res_boxes, width, height);
    debug!("proposal stage: {} boxes", res_boxes.len());
    Ok(res_boxes)
}
