//! Sprite file decoding.
//!
//! Decoding runs in two passes per chunk: a pure parse of the chunk body into a [`Chunk`]
//! (bounded to the chunk's recorded length), followed by applying it to the document being
//! built. Nothing is exposed to the caller unless the whole file decodes.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

use super::bytes::ByteReader;
use super::{
    CHUNK_HEADER_SIZE, Cel, ColorMode, Document, FILE_MAGIC, FRAME_HEADER_SIZE, FRAME_MAGIC, Frame,
    HEADER_SIZE, Layer, LayerFlags, LayerKind, LoopDirection, Slice, Tag, UserData, chunk,
};
use crate::compositing::{blend_fn, blit_cel, bytes_to_pixels, opacity, premultiply};
use crate::error::{AsePackerError, Result};

/// Header flag: layer opacity bytes carry a meaningful value.
const FLAG_LAYER_OPACITY_VALID: u32 = 0x1;

const MAX_PALETTE_LEN: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Decode cel pixels and composite frames. When false only the structure (layers, cel
    /// placement, tags, slices) is read and frame canvases stay transparent.
    pub load_pixels: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { load_pixels: true }
    }
}

struct Header {
    frames: u16,
    width: u16,
    height: u16,
    mode: ColorMode,
    flags: u32,
    transparent_index: u8,
    palette_len: usize,
}

fn read_header(r: &mut ByteReader<'_>) -> Result<Header> {
    let _file_size = r.u32()?;
    let magic = r.u16()?;
    if magic != FILE_MAGIC {
        return Err(AsePackerError::format(
            4,
            format!("bad file magic 0x{magic:04X}"),
        ));
    }
    let frames = r.u16()?;
    let width = r.u16()?;
    let height = r.u16()?;
    let depth = r.u16()?;
    let mode = ColorMode::from_depth(depth)
        .ok_or_else(|| r.error(format!("unsupported color depth {depth}")))?;
    let flags = r.u32()?;
    let _speed = r.u16()?;
    r.skip(8)?;
    let transparent_index = r.u8()?;
    r.skip(3)?;
    let palette_len = match r.u16()? {
        0 => 256,
        n => n as usize,
    };
    r.seek(HEADER_SIZE)?;
    Ok(Header {
        frames,
        width,
        height,
        mode,
        flags,
        transparent_index,
        palette_len,
    })
}

enum CelPayload<'a> {
    Raw { width: u16, height: u16, data: &'a [u8] },
    Compressed { width: u16, height: u16, data: &'a [u8] },
    Linked { frame: u16 },
    Other(u16),
}

struct CelChunk<'a> {
    layer: u16,
    x: i16,
    y: i16,
    opacity: u8,
    payload: CelPayload<'a>,
    /// Absolute offset of the payload, for error reporting.
    offset: usize,
}

struct PaletteChunk {
    new_len: usize,
    first: usize,
    entries: Vec<Rgba<u8>>,
}

/// One parsed chunk body.
enum Chunk<'a> {
    Layer(Layer),
    Cel(CelChunk<'a>),
    Palette(PaletteChunk),
    UserData(UserData),
    Tags(Vec<Tag>),
    Slices(Vec<Slice>),
    Skip { kind: u16, len: usize },
}

type ChunkParser = for<'a> fn(&mut ByteReader<'a>, &Header) -> Result<Chunk<'a>>;

const CHUNK_PARSERS: &[(u16, ChunkParser)] = &[
    (chunk::LAYER, parse_layer),
    (chunk::CEL, parse_cel),
    (chunk::PALETTE, parse_palette),
    (chunk::USER_DATA, parse_user_data),
    (chunk::TAGS, parse_tags),
    (chunk::SLICE, parse_slice),
];

fn parser_for(kind: u16) -> Option<ChunkParser> {
    CHUNK_PARSERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, parse)| *parse)
}

fn parse_layer<'a>(r: &mut ByteReader<'a>, header: &Header) -> Result<Chunk<'a>> {
    let flags = LayerFlags::from_bits_truncate(r.u16()?);
    let kind = LayerKind::from_u16(r.u16()?);
    let child_level = r.u16()?;
    r.skip(4)?; // default width/height, ignored
    let blend_mode = r.u16()?;
    let opacity = r.u8()?;
    r.skip(3)?;
    let name = r.string()?;

    let alpha = if !flags.contains(LayerFlags::VISIBLE) {
        0.0
    } else if header.flags & FLAG_LAYER_OPACITY_VALID != 0 {
        opacity as f32 / 255.0
    } else {
        1.0
    };
    Ok(Chunk::Layer(Layer {
        name,
        flags,
        kind,
        child_level,
        blend_mode,
        alpha,
        user_data: None,
    }))
}

fn parse_cel<'a>(r: &mut ByteReader<'a>, _header: &Header) -> Result<Chunk<'a>> {
    let layer = r.u16()?;
    let x = r.i16()?;
    let y = r.i16()?;
    let opacity = r.u8()?;
    let kind = r.u16()?;
    let _z_index = r.i16()?;
    r.skip(5)?;
    let offset = r.offset();
    let payload = match kind {
        0 | 2 => {
            let width = r.u16()?;
            let height = r.u16()?;
            let data = r.rest();
            if kind == 0 {
                CelPayload::Raw { width, height, data }
            } else {
                CelPayload::Compressed { width, height, data }
            }
        }
        1 => CelPayload::Linked { frame: r.u16()? },
        other => CelPayload::Other(other),
    };
    Ok(Chunk::Cel(CelChunk {
        layer,
        x,
        y,
        opacity,
        payload,
        offset,
    }))
}

fn parse_palette<'a>(r: &mut ByteReader<'a>, _header: &Header) -> Result<Chunk<'a>> {
    let new_len = r.u32()? as usize;
    let first = r.u32()? as usize;
    let last = r.u32()? as usize;
    r.skip(8)?;
    if last < first || last >= MAX_PALETTE_LEN || new_len > MAX_PALETTE_LEN {
        return Err(r.error(format!(
            "palette of {new_len} entries with range {first}..={last} is invalid"
        )));
    }
    let mut entries = Vec::with_capacity(last - first + 1);
    for _ in first..=last {
        let entry_flags = r.u16()?;
        let [red, green, blue, alpha] = [r.u8()?, r.u8()?, r.u8()?, r.u8()?];
        if entry_flags & 1 != 0 {
            let _name = r.string()?;
        }
        entries.push(premultiply(red, green, blue, alpha));
    }
    Ok(Chunk::Palette(PaletteChunk {
        new_len,
        first,
        entries,
    }))
}

fn parse_user_data<'a>(r: &mut ByteReader<'a>, _header: &Header) -> Result<Chunk<'a>> {
    let flags = r.u32()?;
    let text = if flags & 1 != 0 { Some(r.string()?) } else { None };
    let color = if flags & 2 != 0 {
        let [red, green, blue, alpha] = [r.u8()?, r.u8()?, r.u8()?, r.u8()?];
        Some(premultiply(red, green, blue, alpha))
    } else {
        None
    };
    Ok(Chunk::UserData(UserData { text, color }))
}

fn parse_tags<'a>(r: &mut ByteReader<'a>, _header: &Header) -> Result<Chunk<'a>> {
    let count = r.u16()?;
    r.skip(8)?;
    let mut tags = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let from = r.u16()?;
        let to = r.u16()?;
        let direction = LoopDirection::from_u8(r.u8()?);
        r.skip(8)?;
        let [red, green, blue] = [r.u8()?, r.u8()?, r.u8()?];
        r.skip(1)?;
        let name = r.string()?;
        tags.push(Tag {
            name,
            from,
            to,
            direction,
            color: premultiply(red, green, blue, 255),
        });
    }
    Ok(Chunk::Tags(tags))
}

/// Reads a slice chunk, one [`Slice`] per key. Nine-slice centers are skipped.
fn parse_slice<'a>(r: &mut ByteReader<'a>, _header: &Header) -> Result<Chunk<'a>> {
    let key_count = r.u32()?;
    let flags = r.u32()?;
    r.skip(4)?;
    let name = r.string()?;
    let mut slices = Vec::new();
    for _ in 0..key_count {
        let frame = r.u32()?;
        let origin_x = r.i32()?;
        let origin_y = r.i32()?;
        let width = r.u32()?;
        let height = r.u32()?;
        if flags & 1 != 0 {
            r.skip(16)?;
        }
        let pivot = if flags & 2 != 0 {
            Some((r.i32()?, r.i32()?))
        } else {
            None
        };
        slices.push(Slice {
            name: name.clone(),
            frame,
            origin_x,
            origin_y,
            width,
            height,
            pivot,
            user_data: None,
        });
    }
    Ok(Chunk::Slices(slices))
}

/// Entity the next user-data chunk belongs to.
#[derive(Debug, Clone, Copy)]
enum UserDataTarget {
    Layer(usize),
    Cel(usize),
    Slice(usize),
}

/// Document state accumulated while walking frames.
struct Builder<'o> {
    opts: &'o DecodeOptions,
    mode: ColorMode,
    palette: Vec<Rgba<u8>>,
    layers: Vec<Layer>,
    frames: Vec<Frame>,
    tags: Vec<Tag>,
    slices: Vec<Slice>,
}

impl Builder<'_> {
    fn apply(
        &mut self,
        chunk: Chunk<'_>,
        frame: &mut Frame,
        target: &mut Option<UserDataTarget>,
    ) -> Result<()> {
        match chunk {
            Chunk::Layer(layer) => {
                self.layers.push(layer);
                *target = Some(UserDataTarget::Layer(self.layers.len() - 1));
            }
            Chunk::Cel(cel) => {
                self.apply_cel(cel, frame)?;
                *target = Some(UserDataTarget::Cel(frame.cels.len() - 1));
            }
            Chunk::Palette(p) => {
                if p.new_len > self.palette.len() {
                    self.palette.resize(p.new_len, Rgba([0, 0, 0, 0]));
                }
                let end = p.first + p.entries.len();
                if end > self.palette.len() {
                    self.palette.resize(end, Rgba([0, 0, 0, 0]));
                }
                self.palette[p.first..end].copy_from_slice(&p.entries);
                *target = None;
            }
            Chunk::UserData(data) => match *target {
                Some(UserDataTarget::Layer(i)) => self.layers[i].user_data = Some(data),
                Some(UserDataTarget::Cel(i)) => frame.cels[i].user_data = Some(data),
                Some(UserDataTarget::Slice(i)) => self.slices[i].user_data = Some(data),
                None => trace!("user data with no owner ignored"),
            },
            Chunk::Tags(tags) => {
                self.tags.extend(tags);
                *target = None;
            }
            Chunk::Slices(slices) => {
                // User data that follows belongs to the last key.
                if !slices.is_empty() {
                    self.slices.extend(slices);
                    *target = Some(UserDataTarget::Slice(self.slices.len() - 1));
                }
            }
            Chunk::Skip { kind, len } => {
                debug!("skipping {} chunk 0x{kind:04X} ({len} bytes)", chunk::name(kind));
            }
        }
        Ok(())
    }

    fn apply_cel(&mut self, cel: CelChunk<'_>, frame: &mut Frame) -> Result<()> {
        let layer_index = cel.layer as usize;
        let layer_alpha = self
            .layers
            .get(layer_index)
            .map(|l| l.alpha)
            .ok_or_else(|| {
                AsePackerError::format(
                    cel.offset,
                    format!(
                        "cel references layer {layer_index} but only {} are defined",
                        self.layers.len()
                    ),
                )
            })?;
        let blend = blend_fn(self.layers[layer_index].blend_mode);
        let cel_alpha = cel.opacity as f32 / 255.0;

        let (width, height, pixels) = match cel.payload {
            CelPayload::Raw { width, height, data } => {
                let pixels = self.cel_pixels(width, height, data, cel.offset, false)?;
                (width as u32, height as u32, pixels)
            }
            CelPayload::Compressed { width, height, data } => {
                let pixels = self.cel_pixels(width, height, data, cel.offset, true)?;
                (width as u32, height as u32, pixels)
            }
            CelPayload::Linked { frame: linked } => {
                debug!(layer = layer_index, linked_frame = linked, "linked cel not resolved");
                (0, 0, None)
            }
            CelPayload::Other(kind) => {
                debug!(layer = layer_index, kind, "unsupported cel type");
                (0, 0, None)
            }
        };

        if let Some(px) = &pixels {
            let op = opacity(cel_alpha, layer_alpha);
            if op > 0 {
                blit_cel(&mut frame.pixels, px, cel.x as i32, cel.y as i32, op, blend);
            }
        }
        frame.cels.push(Cel {
            layer: layer_index,
            x: cel.x as i32,
            y: cel.y as i32,
            width,
            height,
            alpha: cel_alpha,
            pixels,
            user_data: None,
        });
        Ok(())
    }

    fn cel_pixels(
        &self,
        width: u16,
        height: u16,
        data: &[u8],
        offset: usize,
        compressed: bool,
    ) -> Result<Option<RgbaImage>> {
        if !self.opts.load_pixels {
            return Ok(None);
        }
        // Sizes come from the cel header; nothing is allocated until the bytes are known to exist.
        let need = width as usize * height as usize * self.mode.bytes_per_pixel();
        let inflated;
        let raw = if compressed {
            let mut out = Vec::new();
            ZlibDecoder::new(data)
                .take(need as u64)
                .read_to_end(&mut out)
                .map_err(|e| {
                    AsePackerError::format(offset, format!("cel data failed to inflate: {e}"))
                })?;
            inflated = out;
            &inflated[..]
        } else {
            data
        };
        let raw = raw.get(..need).ok_or_else(|| {
            AsePackerError::format(
                offset,
                format!(
                    "{width}x{height} cel holds {} pixel bytes, expected {need}",
                    raw.len()
                ),
            )
        })?;
        let mut pixels = RgbaImage::new(width as u32, height as u32);
        bytes_to_pixels(raw, self.mode, &self.palette, &mut pixels);
        Ok(Some(pixels))
    }
}

/// Decodes a complete sprite file held in memory.
pub fn decode(data: &[u8], opts: &DecodeOptions) -> Result<Document> {
    let mut r = ByteReader::new(data);
    let header = read_header(&mut r)?;
    let (width, height) = (header.width as u32, header.height as u32);

    let mut builder = Builder {
        opts,
        mode: header.mode,
        palette: vec![Rgba([0, 0, 0, 0]); header.palette_len],
        layers: Vec::new(),
        frames: Vec::with_capacity(header.frames as usize),
        tags: Vec::new(),
        slices: Vec::new(),
    };

    for frame_index in 0..header.frames {
        let frame_start = r.position();
        let frame_len = r.u32()? as usize;
        let magic = r.u16()?;
        if magic != FRAME_MAGIC {
            return Err(AsePackerError::format(
                frame_start + 4,
                format!("frame {frame_index} has bad magic 0x{magic:04X}"),
            ));
        }
        let old_count = r.u16()?;
        let duration = r.u16()?;
        r.skip(2)?;
        let new_count = r.u32()?;
        let chunk_count = if new_count != 0 { new_count } else { old_count as u32 };

        let frame_end = frame_start
            .checked_add(frame_len)
            .filter(|&end| frame_len >= FRAME_HEADER_SIZE && end <= data.len())
            .ok_or_else(|| {
                AsePackerError::format(
                    frame_start,
                    format!(
                        "frame {frame_index} claims {frame_len} bytes, {} available",
                        data.len() - frame_start
                    ),
                )
            })?;

        let mut frame = Frame {
            duration,
            cels: Vec::new(),
            pixels: RgbaImage::new(width, height),
        };
        let mut target = None;
        let mut frame_reader = r.sub(0, frame_end)?;
        frame_reader.seek(r.position())?;

        for _ in 0..chunk_count {
            let chunk_start = frame_reader.position();
            let chunk_len = frame_reader.u32()? as usize;
            let kind = frame_reader.u16()?;
            let chunk_end = chunk_start
                .checked_add(chunk_len)
                .filter(|&end| chunk_len >= CHUNK_HEADER_SIZE && end <= frame_end)
                .ok_or_else(|| {
                    AsePackerError::format(
                        chunk_start,
                        format!(
                            "chunk 0x{kind:04X} length {chunk_len} overruns frame {frame_index}"
                        ),
                    )
                })?;
            let mut body = frame_reader.sub(chunk_start + CHUNK_HEADER_SIZE, chunk_end)?;
            let parsed = match parser_for(kind) {
                Some(parse) => parse(&mut body, &header)?,
                None => Chunk::Skip {
                    kind,
                    len: chunk_len,
                },
            };
            builder.apply(parsed, &mut frame, &mut target)?;
            frame_reader.seek(chunk_end)?;
        }

        builder.frames.push(frame);
        r.seek(frame_end)?;
    }

    Ok(Document {
        mode: header.mode,
        width,
        height,
        flags: header.flags,
        transparent_index: header.transparent_index,
        palette: builder.palette,
        layers: builder.layers,
        frames: builder.frames,
        tags: builder.tags,
        slices: builder.slices,
    })
}
