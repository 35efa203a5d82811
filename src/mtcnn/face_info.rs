/// Scored rectangle. Extents are pixel-inclusive: width is `xmax - xmin + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, score: f32) -> FaceBox {
        FaceBox { xmin, ymin, xmax, ymax, score }
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin + 1.0
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.ymax - self.ymin + 1.0
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One candidate travelling through the cascade.
///
/// `bbox_reg` holds `(dx_min, dy_min, dx_max, dy_max)` relative to the box
/// width/height; it is only applied by [`super::bbox::regress`].
/// `landmark` holds five `(x, y)` points in image coordinates and stays zeroed
/// until the output network fills it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceInfo {
    pub bbox: FaceBox,
    pub bbox_reg: [f32; 4],
    pub landmark: [f32; 10],
}

impl FaceInfo {
    pub fn new(bbox: FaceBox) -> FaceInfo {
        FaceInfo { bbox, ..Default::default() }
    }

    pub fn with_regression(bbox: FaceBox, bbox_reg: [f32; 4]) -> FaceInfo {
        FaceInfo { bbox, bbox_reg, ..Default::default() }
    }

    #[inline(always)]
    pub fn score(&self) -> f32 {
        self.bbox.score
    }
}
