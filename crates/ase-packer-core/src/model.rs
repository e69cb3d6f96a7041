use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Inclusive right edge coordinate (`x + w - 1`).
    pub fn right(&self) -> u32 {
        self.x + self.w.saturating_sub(1)
    }
    /// Inclusive bottom edge coordinate (`y + h - 1`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h.saturating_sub(1)
    }
    /// Returns true if `r` is fully inside `self` (inclusive edges).
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x && r.y >= self.y && r.right() <= self.right() && r.bottom() <= self.bottom()
    }
    /// Returns true if the two rectangles share at least one pixel. Empty rects never overlap.
    pub fn overlaps(&self, r: &Rect) -> bool {
        self.w > 0
            && self.h > 0
            && r.w > 0
            && r.h > 0
            && self.x < r.x + r.w
            && r.x < self.x + self.w
            && self.y < r.y + r.h
            && r.y < self.y + self.h
    }
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// A premultiplied image placed in sprite space.
#[derive(Debug, Clone, PartialEq)]
pub struct CelImage {
    pub image: RgbaImage,
    pub x: i32,
    pub y: i32,
}

impl CelImage {
    pub fn new(image: RgbaImage, x: i32, y: i32) -> Self {
        Self { image, x, y }
    }

    /// 1x1 fully transparent image at the sprite origin.
    pub fn empty() -> Self {
        Self::new(RgbaImage::new(1, 1), 0, 0)
    }
}

/// Where every layer/frame of one sprite landed on its page.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub name: String,
    /// Canonical pre-crop size.
    pub width: u32,
    pub height: u32,
    /// Frame count.
    pub length: usize,
    pub layers: usize,
    /// `[layer][frame]` packed rectangle on the page texture.
    pub positions: Vec<Vec<Rect>>,
    /// `[layer][frame]` sprite-space position of each packed rectangle's top-left pixel.
    pub crop_offsets: Vec<Vec<[i32; 2]>>,
    pub origin_x: i32,
    pub origin_y: i32,
    /// Per-frame marker positions; a sequence may stop before `length`.
    pub attach_points: BTreeMap<String, Vec<[i32; 2]>>,
}

impl Sprite {
    /// Sprite with zeroed positions and crop offsets for `layers x length` cels.
    pub fn new(name: impl Into<String>, width: u32, height: u32, layers: usize, length: usize) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            length,
            layers,
            positions: vec![vec![Rect::default(); length]; layers],
            crop_offsets: vec![vec![[0, 0]; length]; layers],
            origin_x: 0,
            origin_y: 0,
            attach_points: BTreeMap::new(),
        }
    }

    /// True when any layer/frame was cropped away from the sprite origin.
    pub fn has_crop_offsets(&self) -> bool {
        self.crop_offsets
            .iter()
            .flatten()
            .any(|offset| *offset != [0, 0])
    }

    /// Iterates every placement as `(layer, frame, rect)`.
    pub fn placements(&self) -> impl Iterator<Item = (usize, usize, Rect)> + '_ {
        self.positions.iter().enumerate().flat_map(|(layer, frames)| {
            frames
                .iter()
                .enumerate()
                .map(move |(frame, rect)| (layer, frame, *rect))
        })
    }
}

/// Statistics about page packing efficiency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PackStats {
    pub num_sprites: usize,
    /// Total number of packed layer/frame images.
    pub num_placements: usize,
    /// Width * height of the page texture.
    pub page_area: u64,
    /// Sum of placement areas, excluding padding.
    pub used_area: u64,
    /// used_area / page_area (0.0 to 1.0).
    pub occupancy: f64,
}

impl PackStats {
    pub fn from_sprites<'a>(page_size: u32, sprites: impl IntoIterator<Item = &'a Sprite>) -> Self {
        let mut num_sprites = 0;
        let mut num_placements = 0;
        let mut used_area = 0u64;
        for sprite in sprites {
            num_sprites += 1;
            for (_, _, rect) in sprite.placements() {
                num_placements += 1;
                used_area += rect.area();
            }
        }
        let page_area = page_size as u64 * page_size as u64;
        let occupancy = if page_area > 0 {
            used_area as f64 / page_area as f64
        } else {
            0.0
        };
        Self {
            num_sprites,
            num_placements,
            page_area,
            used_area,
            occupancy,
        }
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Sprites: {}, Placements: {}, Occupancy: {:.2}%, Page Area: {} px², Used Area: {} px²",
            self.num_sprites,
            self.num_placements,
            self.occupancy * 100.0,
            self.page_area,
            self.used_area,
        )
    }

    /// Returns wasted space in pixels.
    pub fn wasted_area(&self) -> u64 {
        self.page_area.saturating_sub(self.used_area)
    }
}
