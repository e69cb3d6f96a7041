//! Opaque-bounds cropping applied to every cel before it is packed.

use std::ops::RangeInclusive;

use image::{RgbaImage, imageops};

use crate::model::{CelImage, Rect};

/// Smallest rectangle enclosing every pixel with alpha > 0, or `None` when the image is fully
/// transparent.
pub fn opaque_bounds(rgba: &RgbaImage) -> Option<Rect> {
    let (w, h) = rgba.dimensions();
    let opaque_col = |x: u32| (0..h).any(|y| rgba.get_pixel(x, y)[3] > 0);
    let opaque_row =
        |y: u32, xs: RangeInclusive<u32>| xs.into_iter().any(|x| rgba.get_pixel(x, y)[3] > 0);

    // left
    let mut x1 = 0;
    while x1 < w && !opaque_col(x1) {
        x1 += 1;
    }
    if x1 >= w {
        return None;
    }
    // right
    let mut x2 = w - 1;
    while x2 > x1 && !opaque_col(x2) {
        x2 -= 1;
    }
    // top
    let mut y1 = 0;
    while y1 < h && !opaque_row(y1, x1..=x2) {
        y1 += 1;
    }
    // bottom
    let mut y2 = h - 1;
    while y2 > y1 && !opaque_row(y2, x1..=x2) {
        y2 -= 1;
    }
    Some(Rect::new(x1, y1, x2 - x1 + 1, y2 - y1 + 1))
}

/// Crops a cel to its opaque bounds. The result's position is the sprite-space location of
/// its top-left pixel, i.e. the crop offset to record for it.
///
/// Fully transparent cels collapse to a 1x1 transparent image at (0, 0).
pub fn crop_cel(cel: &CelImage) -> CelImage {
    match opaque_bounds(&cel.image) {
        Some(r) => {
            let image = imageops::crop_imm(&cel.image, r.x, r.y, r.w, r.h).to_image();
            CelImage::new(image, cel.x + r.x as i32, cel.y + r.y as i32)
        }
        None => CelImage::empty(),
    }
}
