use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use rayon::prelude::*;

use super::face_info::{FaceBox, FaceInfo};
use crate::error::{DetectError, Result};

pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
}

/// Pixel rectangle `(x, y, width, height)` read from a box.
///
/// Coordinates are truncated, the origin is clamped into the image and the
/// size is clamped to `[1, remaining extent]`, so degenerate boxes still
/// yield a one pixel region.
pub fn crop_rect(bbox: &FaceBox, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let clamp_origin = |v: f32, extent: u32| (v as i64).clamp(0, extent.saturating_sub(1) as i64) as u32;
    let x = clamp_origin(bbox.xmin, image_width);
    let y = clamp_origin(bbox.ymin, image_height);
    let w = ((bbox.xmax - bbox.xmin) as i64).clamp(1, (image_width - x).max(1) as i64) as u32;
    let h = ((bbox.ymax - bbox.ymin) as i64).clamp(1, (image_height - y).max(1) as i64) as u32;
    (x, y, w, h)
}

pub fn crop(image: &RgbImage, bbox: &FaceBox) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return RgbImage::new(1, 1);
    }
    let (x, y, w, h) = crop_rect(bbox, width, height);
    imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Crops every candidate region and resizes it to `width` x `height`.
/// Output order follows `faces`.
pub fn crop_batch(image: &RgbImage, faces: &[FaceInfo], width: u32, height: u32) -> Vec<RgbImage> {
    faces
        .par_iter()
        .map(|info| resize(&crop(image, &info.bbox), width, height))
        .collect()
}

/// Packs images into an NCHW tensor of `(pixel - mean) * scale`, channels in
/// BGR order.
pub fn blob_from_images(images: &[RgbImage], scale: f32, mean: f32) -> Result<Array4<f32>> {
    let (width, height) = images.first().map(|i| i.dimensions()).unwrap_or((0, 0));
    if let Some(other) = images.iter().find(|i| i.dimensions() != (width, height)) {
        return Err(DetectError::InvalidArgument(format!(
            "blob images must share one size: {}x{} vs {}x{}",
            width,
            height,
            other.width(),
            other.height()
        )));
    }
    // NCHW
    let blob = Array4::from_shape_fn(
        (images.len(), 3, height as usize, width as usize),
        |(n, c, y, x)| {
            let pixel = images[n].get_pixel(x as u32, y as u32);
            (pixel[2 - c] as f32 - mean) * scale
        },
    );
    Ok(blob)
}
