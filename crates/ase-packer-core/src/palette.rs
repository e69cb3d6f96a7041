//! Indexed-color round trip through an RGBA atlas.
//!
//! A palette lookup image lists one color per row in its first column. Row 0 stands for "no
//! color" and is never assigned. Indexed sprites are stored on the page as `(row, row, row, a)`
//! and mapped back to the row's color on unpack.

use image::{Rgba, RgbaImage};
use tracing::warn;

use crate::compositing::premultiply;
use crate::error::{AsePackerError, Result};

/// Colors of one layer's lookup image, premultiplied, indexed by row.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    rows: Vec<Rgba<u8>>,
}

impl Palette {
    /// Reads column 0 of a straight-alpha lookup image. Rows past 255 cannot be addressed and
    /// are dropped.
    pub fn from_lookup(image: &RgbaImage) -> Self {
        if image.width() == 0 {
            return Self { rows: Vec::new() };
        }
        let rows = (0..image.height().min(256))
            .map(|y| {
                let [r, g, b, a] = image.get_pixel(0, y).0;
                premultiply(r, g, b, a)
            })
            .collect();
        Self { rows }
    }

    pub fn from_colors(rows: Vec<Rgba<u8>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn color(&self, row: u8) -> Option<Rgba<u8>> {
        self.rows.get(row as usize).copied()
    }

    /// Closest assignable row (>= 1) by largest per-channel difference, with that difference.
    /// Ties go to the lower row.
    pub fn nearest(&self, px: Rgba<u8>) -> Option<(u8, u8)> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .map(|(row, color)| (row as u8, channel_distance(*color, px)))
            .min_by_key(|&(row, dist)| (dist, row))
    }
}

fn channel_distance(a: Rgba<u8>, b: Rgba<u8>) -> u8 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

/// Replaces every visible pixel by its palette row. Returns how many pixels matched no row
/// within `threshold`.
pub fn index_image(image: &mut RgbaImage, palette: &Palette, threshold: u8) -> Result<usize> {
    if palette.len() < 2 {
        return Err(AsePackerError::InvalidInput(
            "palette lookup image needs at least one color row below row 0".into(),
        ));
    }
    let mut far = 0;
    for px in image.pixels_mut() {
        let alpha = px[3];
        if alpha == 0 {
            continue;
        }
        if let Some((row, dist)) = palette.nearest(*px) {
            if dist > threshold {
                far += 1;
            }
            *px = Rgba([row, row, row, alpha]);
        }
    }
    Ok(far)
}

/// Maps `(row, _, _, a)` pixels back to palette colors. Pixels with alpha 0 become fully
/// transparent; rows the palette does not have are left transparent and counted.
pub fn deindex_image(image: &mut RgbaImage, palette: &Palette) -> usize {
    let mut missing = 0;
    for px in image.pixels_mut() {
        if px[3] == 0 {
            *px = Rgba([0, 0, 0, 0]);
            continue;
        }
        *px = match palette.color(px[0]) {
            Some(color) => color,
            None => {
                missing += 1;
                Rgba([0, 0, 0, 0])
            }
        };
    }
    if missing > 0 {
        warn!(missing, rows = palette.len(), "pixels reference palette rows that do not exist");
    }
    missing
}
