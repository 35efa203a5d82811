use super::face_info::FaceInfo;

/// Shifts every box by its regression deltas, scaled by the pre-regression
/// width and height.
pub fn regress(bboxes: &mut [FaceInfo]) {
    for info in bboxes.iter_mut() {
        let w = info.bbox.width();
        let h = info.bbox.height();
        let [dx1, dy1, dx2, dy2] = info.bbox_reg;

        info.bbox.xmin += dx1 * w;
        info.bbox.ymin += dy1 * h;
        info.bbox.xmax += dx2 * w;
        info.bbox.ymax += dy2 * h;
    }
}

/// Clamps every box to `[0, width-1] x [0, height-1]` and rounds it.
pub fn pad(bboxes: &mut [FaceInfo], width: u32, height: u32) {
    let (max_x, max_y) = (width as f32 - 1.0, height as f32 - 1.0);
    for info in bboxes.iter_mut() {
        let b = &mut info.bbox;
        b.xmin = b.xmin.max(0.0).round();
        b.ymin = b.ymin.max(0.0).round();
        b.xmax = b.xmax.min(max_x).round();
        b.ymax = b.ymax.min(max_y).round();
    }
}

/// Grows every box to a square around its centre, then clamps and rounds it.
///
/// The far edges are derived from the already rounded near edges, so a box
/// touching the right or bottom border ends up narrower than `side`.
pub fn pad_square(bboxes: &mut [FaceInfo], width: u32, height: u32) {
    let (max_x, max_y) = (width as f32 - 1.0, height as f32 - 1.0);
    for info in bboxes.iter_mut() {
        let b = &mut info.bbox;
        let w = b.width();
        let h = b.height();
        let side = if h > w { h } else { w };

        b.xmin = (b.xmin + (w - side) * 0.5).max(0.0).round();
        b.ymin = (b.ymin + (h - side) * 0.5).max(0.0).round();
        b.xmax = (b.xmin + side - 1.0).min(max_x).round();
        b.ymax = (b.ymin + side - 1.0).min(max_y).round();
    }
}
