//! Sprite file encoding.
//!
//! Output is always 32-bit RGBA. Real layers come first (`Layer {i}`), followed by one hidden
//! 1x1 layer per attach point and a hidden `_origin` layer, so a decoder sees markers as layers
//! without them ever touching frame composites.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::RgbaImage;

use super::bytes::{ByteWriter, Reservation};
use super::{
    ATTACH_LAYER_PREFIX, ColorMode, FILE_MAGIC, FRAME_MAGIC, LayerFlags, ORIGIN_LAYER_NAME, chunk,
};
use crate::compositing::unpremultiply;
use crate::error::{AsePackerError, Result};
use crate::model::CelImage;

pub const DEFAULT_FRAME_DURATION_MS: u16 = 100;

/// Straight-alpha pixel written for marker cels. Only its placement matters.
const MARKER_PIXEL: [u8; 4] = [255, 255, 255, 255];

/// Everything needed to write one sprite file.
#[derive(Debug, Clone)]
pub struct EncodeRequest<'a> {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    /// Cels indexed `[layer][frame]`, premultiplied, positioned in sprite space.
    pub layers: &'a [Vec<CelImage>],
    pub attach_points: &'a BTreeMap<String, Vec<[i32; 2]>>,
    pub origin: (i32, i32),
    pub frame_duration_ms: u16,
}

impl EncodeRequest<'_> {
    fn validate(&self) -> Result<()> {
        if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
            return Err(AsePackerError::Encode(format!(
                "sprite size {}x{} does not fit the format",
                self.width, self.height
            )));
        }
        if self.frame_count == 0 || self.frame_count > u16::MAX as usize {
            return Err(AsePackerError::Encode(format!(
                "frame count {} out of range",
                self.frame_count
            )));
        }
        let layer_total = self.layers.len() + self.attach_points.len() + 1;
        if layer_total > u16::MAX as usize {
            return Err(AsePackerError::Encode(format!("{layer_total} layers is too many")));
        }
        for (i, frames) in self.layers.iter().enumerate() {
            if frames.len() != self.frame_count {
                return Err(AsePackerError::Encode(format!(
                    "layer {i} has {} cels, expected {}",
                    frames.len(),
                    self.frame_count
                )));
            }
        }
        for (name, points) in self.attach_points {
            if points.len() > self.frame_count {
                return Err(AsePackerError::Encode(format!(
                    "attach point '{name}' has {} frames, sprite has {}",
                    points.len(),
                    self.frame_count
                )));
            }
        }
        Ok(())
    }

    /// Chunks in frame `frame`: one cel per real layer, one per attach point still running,
    /// and the origin cel in frame 0.
    fn cel_count(&self, frame: usize) -> usize {
        let attach = self
            .attach_points
            .values()
            .filter(|points| frame < points.len())
            .count();
        self.layers.len() + attach + usize::from(frame == 0)
    }
}

/// Serializes `req` into a complete sprite file.
pub fn encode(req: &EncodeRequest<'_>) -> Result<Vec<u8>> {
    req.validate()?;
    let mut w = ByteWriter::new();
    let file_size = w.reserve_u32();
    write_header(&mut w, req);

    for frame in 0..req.frame_count {
        let layer_chunks = if frame == 0 {
            req.layers.len() + req.attach_points.len() + 1
        } else {
            0
        };
        let frame_size = begin_frame(&mut w, layer_chunks + req.cel_count(frame), req);
        if frame == 0 {
            write_layer_chunks(&mut w, req)?;
        }
        write_cel_chunks(&mut w, req, frame)?;
        w.patch_span(frame_size)?;
    }

    w.patch_span(file_size)?;
    Ok(w.into_inner())
}

fn write_header(w: &mut ByteWriter, req: &EncodeRequest<'_>) {
    w.u16(FILE_MAGIC);
    w.u16(req.frame_count as u16);
    w.u16(req.width as u16);
    w.u16(req.height as u16);
    w.u16(ColorMode::Rgba.depth());
    w.u32(1); // layer opacity is valid
    w.u16(0); // deprecated speed
    w.zeros(8);
    w.u8(0); // transparent index
    w.zeros(3);
    w.u16(0); // palette count, 0 means 256
    w.zeros(2); // pixel ratio 1:1
    w.i16(0);
    w.i16(0);
    w.u16(16);
    w.u16(16);
    w.zeros(84);
}

fn begin_frame(w: &mut ByteWriter, chunks: usize, req: &EncodeRequest<'_>) -> Reservation {
    let size = w.reserve_u32();
    w.u16(FRAME_MAGIC);
    w.u16(chunks.min(0xFFFF) as u16);
    w.u16(req.frame_duration_ms);
    w.zeros(2);
    w.u32(chunks as u32);
    size
}

fn write_chunk(
    w: &mut ByteWriter,
    kind: u16,
    body: impl FnOnce(&mut ByteWriter) -> Result<()>,
) -> Result<()> {
    let size = w.reserve_u32();
    w.u16(kind);
    body(w)?;
    w.patch_span(size)
}

fn write_layer_chunks(w: &mut ByteWriter, req: &EncodeRequest<'_>) -> Result<()> {
    let visible = LayerFlags::VISIBLE | LayerFlags::EDITABLE;
    for i in 0..req.layers.len() {
        write_layer_chunk(w, &format!("Layer {i}"), visible)?;
    }
    for name in req.attach_points.keys() {
        write_layer_chunk(
            w,
            &format!("{ATTACH_LAYER_PREFIX}{name}"),
            LayerFlags::EDITABLE,
        )?;
    }
    write_layer_chunk(w, ORIGIN_LAYER_NAME, LayerFlags::EDITABLE)
}

fn write_layer_chunk(w: &mut ByteWriter, name: &str, flags: LayerFlags) -> Result<()> {
    write_chunk(w, chunk::LAYER, |w| {
        w.u16(flags.bits());
        w.u16(0); // normal layer
        w.u16(0); // child level
        w.u16(0);
        w.u16(0);
        w.u16(0); // blend mode: normal
        w.u8(255);
        w.zeros(3);
        w.string(name)
    })
}

fn write_cel_chunks(w: &mut ByteWriter, req: &EncodeRequest<'_>, frame: usize) -> Result<()> {
    for (layer, frames) in req.layers.iter().enumerate() {
        let cel = &frames[frame];
        write_cel_chunk(w, layer, cel.x, cel.y, &cel.image)?;
    }

    let marker = RgbaImage::from_raw(1, 1, MARKER_PIXEL.to_vec())
        .ok_or_else(|| AsePackerError::Encode("marker pixel buffer".into()))?;
    let mut layer = req.layers.len();
    for points in req.attach_points.values() {
        if let Some([x, y]) = points.get(frame) {
            write_straight_cel(w, layer, *x, *y, &marker)?;
        }
        layer += 1;
    }
    if frame == 0 {
        write_straight_cel(w, layer, req.origin.0, req.origin.1, &marker)?;
    }
    Ok(())
}

/// Writes a premultiplied image as a compressed cel.
fn write_cel_chunk(w: &mut ByteWriter, layer: usize, x: i32, y: i32, image: &RgbaImage) -> Result<()> {
    let mut straight = image.clone();
    for px in straight.pixels_mut() {
        *px = unpremultiply(*px);
    }
    write_straight_cel(w, layer, x, y, &straight)
}

fn write_straight_cel(
    w: &mut ByteWriter,
    layer: usize,
    x: i32,
    y: i32,
    image: &RgbaImage,
) -> Result<()> {
    let (x, y) = (cel_coord(x)?, cel_coord(y)?);
    let width = u16::try_from(image.width())
        .map_err(|_| AsePackerError::Encode(format!("cel width {} too large", image.width())))?;
    let height = u16::try_from(image.height())
        .map_err(|_| AsePackerError::Encode(format!("cel height {} too large", image.height())))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(image.as_raw())?;
    let compressed = encoder.finish()?;

    write_chunk(w, chunk::CEL, |w| {
        w.u16(layer as u16);
        w.i16(x);
        w.i16(y);
        w.u8(255);
        w.u16(2); // compressed image
        w.i16(0); // z-index
        w.zeros(5);
        w.u16(width);
        w.u16(height);
        w.bytes(&compressed);
        Ok(())
    })
}

fn cel_coord(v: i32) -> Result<i16> {
    i16::try_from(v).map_err(|_| AsePackerError::Encode(format!("cel position {v} out of range")))
}
