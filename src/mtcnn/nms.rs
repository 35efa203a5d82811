use itertools::Itertools;

use super::face_info::{FaceBox, FaceInfo};

/// Denominator of the overlap ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmsMethod {
    /// Intersection over union.
    Union,
    /// Intersection over the smaller of the two areas.
    Min,
}

/// Overlap ratio of two boxes, `0.0` when they do not intersect.
pub fn overlap(a: &FaceBox, b: &FaceBox, method: NmsMethod) -> f32 {
    let x = a.xmin.max(b.xmin);
    let y = a.ymin.max(b.ymin);
    let w = a.xmax.min(b.xmax) - x + 1.0;
    let h = a.ymax.min(b.ymax) - y + 1.0;
    if w <= 0.0 || h <= 0.0 {
        // Boxes are not intersecting at all
        return 0.0;
    }
    let intersection = w * h;
    match method {
        NmsMethod::Union => intersection / (a.area() + b.area() - intersection),
        NmsMethod::Min => intersection / a.area().min(b.area()),
    }
}

/// Greedy non-maximum suppression.
///
/// Candidates are stably sorted by *ascending* score and scanned from the
/// front: the first unsuppressed candidate is kept and suppresses every later
/// unsuppressed candidate whose overlap with it exceeds `thresh`. Survivors
/// are returned in that ascending order.
///
/// # Examples
///
/// ```
/// use mtcnn_cascade::mtcnn::{FaceBox, FaceInfo, NmsMethod};
/// use mtcnn_cascade::mtcnn::nms::nms;
///
/// let boxes = vec![
///     FaceInfo::new(FaceBox::new(0.0, 0.0, 9.0, 9.0, 0.9)),
///     FaceInfo::new(FaceBox::new(1.0, 1.0, 10.0, 10.0, 0.2)),
/// ];
/// let keep = nms(boxes, 0.5, NmsMethod::Union);
/// assert_eq!(keep.len(), 1);
/// assert_eq!(keep[0].score(), 0.2);
/// ```
pub fn nms(bboxes: Vec<FaceInfo>, thresh: f32, method: NmsMethod) -> Vec<FaceInfo> {
    if bboxes.is_empty() {
        return bboxes;
    }

    let order = bboxes
        .into_iter()
        .sorted_by(|a, b| a.score().total_cmp(&b.score()))
        .collect::<Vec<_>>();

    let mut keep = vec![false; order.len()];
    let mut suppress = vec![false; order.len()];

    for i in 0..order.len() {
        if suppress[i] {
            continue;
        }
        keep[i] = true;
        suppress[i] = true;
        let select = &order[i].bbox;
        for j in (i + 1)..order.len() {
            if suppress[j] {
                continue;
            }
            if overlap(select, &order[j].bbox, method) > thresh {
                suppress[j] = true;
            }
        }
    }

    order
        .into_iter()
        .zip(keep)
        .filter_map(|(info, kept)| kept.then_some(info))
        .collect()
}
