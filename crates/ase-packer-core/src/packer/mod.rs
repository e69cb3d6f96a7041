use image::RgbaImage;

use crate::model::Rect;

pub mod binary_tree;

pub use binary_tree::BinaryTreePacker;

/// A packer places images onto a fixed-size page and later draws them.
///
/// Implementations must ensure placements never overlap and stay inside the page.
/// `insert` returns `None` when the image cannot be placed; callers must not ignore it.
pub trait Packer {
    /// Places `image` and returns the rectangle its pixels will occupy.
    fn insert(&mut self, image: RgbaImage) -> Option<Rect>;
    /// Draws every placed image onto `canvas`.
    fn render(&self, canvas: &mut RgbaImage);
}
