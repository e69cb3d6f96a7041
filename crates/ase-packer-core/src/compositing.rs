//! Pixel conversion and compositing.
//!
//! Every buffer handled here holds premultiplied RGBA. The normal blend is a direct port of
//! Aseprite's `rgba_blender_normal` and must stay bit-exact with it: `mul_un8` is the 8-bit
//! fixed-point multiply Aseprite uses, not `a * b / 255`.

use image::{Rgba, RgbaImage, imageops};

use crate::ase::ColorMode;

/// Signature shared by every entry of the blend table.
pub type BlendFn = fn(dest: &mut Rgba<u8>, src: Rgba<u8>, opacity: u8);

/// Blend functions indexed by the layer's blend-mode id. Only "normal" is implemented; ids
/// outside the table resolve to it.
const BLEND_FUNCS: [BlendFn; 1] = [blend_normal];

pub fn blend_fn(mode: u16) -> BlendFn {
    BLEND_FUNCS
        .get(mode as usize)
        .copied()
        .unwrap_or(blend_normal)
}

#[inline]
pub fn premultiply(r: u8, g: u8, b: u8, a: u8) -> Rgba<u8> {
    let a32 = a as u32;
    Rgba([
        (r as u32 * a32 / 255) as u8,
        (g as u32 * a32 / 255) as u8,
        (b as u32 * a32 / 255) as u8,
        a,
    ])
}

/// Inverse of [`premultiply`], used when writing straight-alpha RGBA.
///
/// Rounds up so that `premultiply` of the result gives back `px` exactly.
#[inline]
pub fn unpremultiply(px: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = px.0;
    if a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let a32 = a as u32;
    let un = |c: u8| ((c as u32 * 255).div_ceil(a32)).min(255) as u8;
    Rgba([un(r), un(g), un(b), a])
}

#[inline]
pub fn mul_un8(a: i32, b: i32) -> i32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

/// Effective opacity of a cel: `floor(cel_alpha * layer_alpha * 255)`.
#[inline]
pub fn opacity(cel_alpha: f32, layer_alpha: f32) -> u8 {
    (cel_alpha * layer_alpha * 255.0) as u8
}

pub fn blend_normal(dest: &mut Rgba<u8>, src: Rgba<u8>, opacity: u8) {
    if dest[3] == 0 {
        let alpha = (src[3] as u32 * opacity as u32 + 127) / 255;
        *dest = premultiply(src[0], src[1], src[2], alpha as u8);
        return;
    }
    if src[3] == 0 {
        return;
    }

    let sa = mul_un8(src[3] as i32, opacity as i32);
    let ba = dest[3] as i32;
    let ra = sa + ba - mul_un8(ba, sa);
    let channel = |b: u8, s: u8| {
        let b = b as i32;
        (b + (s as i32 - b) * sa / ra) as u8
    };
    *dest = Rgba([
        channel(dest[0], src[0]),
        channel(dest[1], src[1]),
        channel(dest[2], src[2]),
        ra as u8,
    ]);
}

/// Converts raw cel bytes into premultiplied pixels.
///
/// Indexed pixels holding index 0 (or an index past the palette) leave `out` untouched:
/// slot 0 is the transparency placeholder, not a color.
pub fn bytes_to_pixels(bytes: &[u8], mode: ColorMode, palette: &[Rgba<u8>], out: &mut RgbaImage) {
    match mode {
        ColorMode::Rgba => {
            for (px, b) in out.pixels_mut().zip(bytes.chunks_exact(4)) {
                *px = premultiply(b[0], b[1], b[2], b[3]);
            }
        }
        ColorMode::Grayscale => {
            for (px, b) in out.pixels_mut().zip(bytes.chunks_exact(2)) {
                *px = premultiply(b[0], b[0], b[0], b[1]);
            }
        }
        ColorMode::Indexed => {
            for (px, &index) in out.pixels_mut().zip(bytes) {
                if index == 0 {
                    continue;
                }
                if let Some(color) = palette.get(index as usize) {
                    *px = *color;
                }
            }
        }
    }
}

/// Composites `cel` onto `canvas` with its top-left at (x, y). Pixels landing outside the
/// canvas are clipped.
pub fn blit_cel(
    canvas: &mut RgbaImage,
    cel: &RgbaImage,
    x: i32,
    y: i32,
    opacity: u8,
    blend: BlendFn,
) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    for (sx, sy, src) in cel.enumerate_pixels() {
        let dx = x as i64 + sx as i64;
        let dy = y as i64 + sy as i64;
        if dx < 0 || dy < 0 || dx >= cw || dy >= ch {
            continue;
        }
        blend(canvas.get_pixel_mut(dx as u32, dy as u32), *src, opacity);
    }
}

/// Draws `image` at (x, y), first stamping it 1px up, down, left and right so its edge color
/// bleeds into the surrounding gutter.
pub fn blit_extruded(canvas: &mut RgbaImage, image: &RgbaImage, x: u32, y: u32, extrude: bool) {
    let (x, y) = (x as i64, y as i64);
    if extrude {
        for (ox, oy) in [(0, -1), (0, 1), (-1, 0), (1, 0)] {
            imageops::overlay(canvas, image, x + ox, y + oy);
        }
    }
    imageops::replace(canvas, image, x, y);
}
