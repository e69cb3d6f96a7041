//! Aseprite (`.ase` / `.aseprite`) codec.
//!
//! File format: <https://github.com/aseprite/aseprite/blob/main/docs/ase-file-specs.md>
//!
//! Only the chunks the atlas pipeline needs are understood (layers, cels, palette, user data,
//! tags, slices). Everything else is skipped by its recorded length.

pub mod bytes;
pub mod decode;
pub mod encode;

use std::path::Path;

use bitflags::bitflags;
use image::{Rgba, RgbaImage};

use crate::error::Result;

pub use decode::DecodeOptions;
pub use encode::{EncodeRequest, encode};

pub const FILE_MAGIC: u16 = 0xA5E0;
pub const FRAME_MAGIC: u16 = 0xF1FA;
pub const HEADER_SIZE: usize = 128;
pub const FRAME_HEADER_SIZE: usize = 16;
pub const CHUNK_HEADER_SIZE: usize = 6;

/// Layer name prefix marking a synthetic attach-point layer.
pub const ATTACH_LAYER_PREFIX: &str = "_attach_";
/// Name of the synthetic origin layer.
pub const ORIGIN_LAYER_NAME: &str = "_origin";

/// Chunk type tags.
pub mod chunk {
    pub const OLD_PALETTE_A: u16 = 0x0004;
    pub const OLD_PALETTE_B: u16 = 0x0011;
    pub const LAYER: u16 = 0x2004;
    pub const CEL: u16 = 0x2005;
    pub const CEL_EXTRA: u16 = 0x2006;
    pub const COLOR_PROFILE: u16 = 0x2007;
    pub const EXTERNAL_FILES: u16 = 0x2008;
    pub const MASK: u16 = 0x2016;
    pub const PATH: u16 = 0x2017;
    pub const TAGS: u16 = 0x2018;
    pub const PALETTE: u16 = 0x2019;
    pub const USER_DATA: u16 = 0x2020;
    pub const SLICE: u16 = 0x2022;
    pub const TILESET: u16 = 0x2023;

    /// Short name of a chunk type, for logs.
    pub fn name(kind: u16) -> &'static str {
        match kind {
            OLD_PALETTE_A | OLD_PALETTE_B => "old palette",
            LAYER => "layer",
            CEL => "cel",
            CEL_EXTRA => "cel extra",
            COLOR_PROFILE => "color profile",
            EXTERNAL_FILES => "external files",
            MASK => "mask",
            PATH => "path",
            TAGS => "tags",
            PALETTE => "palette",
            USER_DATA => "user data",
            SLICE => "slice",
            TILESET => "tileset",
            _ => "unknown",
        }
    }
}

/// Color mode of the sprite, derived from the header's bits-per-pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Indexed,
    Grayscale,
    Rgba,
}

impl ColorMode {
    pub fn from_depth(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Self::Indexed),
            16 => Some(Self::Grayscale),
            32 => Some(Self::Rgba),
            _ => None,
        }
    }

    pub fn depth(self) -> u16 {
        self.bytes_per_pixel() as u16 * 8
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed => 1,
            Self::Grayscale => 2,
            Self::Rgba => 4,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerFlags: u16 {
        const VISIBLE = 0x0001;
        const EDITABLE = 0x0002;
        const LOCK_MOVEMENT = 0x0004;
        const BACKGROUND = 0x0008;
        const PREFER_LINKED_CELS = 0x0010;
        const COLLAPSED = 0x0020;
        const REFERENCE = 0x0040;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Normal,
    Group,
    Tilemap,
}

impl LayerKind {
    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::Group,
            2 => Self::Tilemap,
            _ => Self::Normal,
        }
    }
}

/// Text and/or color attached to a layer, cel or slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    pub text: Option<String>,
    pub color: Option<Rgba<u8>>,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub flags: LayerFlags,
    pub kind: LayerKind,
    pub child_level: u16,
    pub blend_mode: u16,
    /// Effective opacity in `[0, 1]`; forced to 0 for hidden layers.
    pub alpha: f32,
    pub user_data: Option<UserData>,
}

impl Layer {
    pub fn is_visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }
}

#[derive(Debug, Clone)]
pub struct Cel {
    pub layer: usize,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub alpha: f32,
    /// Decoded premultiplied pixels. `None` for linked cels, tilemaps and structure-only decodes.
    pub pixels: Option<RgbaImage>,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub duration: u16,
    pub cels: Vec<Cel>,
    /// Composite of every visible cel, premultiplied, `width x height` of the document.
    pub pixels: RgbaImage,
}

impl Frame {
    /// First cel placed on `layer` in this frame.
    pub fn cel_for_layer(&self, layer: usize) -> Option<&Cel> {
        self.cels.iter().find(|c| c.layer == layer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDirection {
    Forward,
    Reverse,
    PingPong,
}

impl LoopDirection {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Reverse,
            2 => Self::PingPong,
            _ => Self::Forward,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub from: u16,
    pub to: u16,
    pub direction: LoopDirection,
    pub color: Rgba<u8>,
}

#[derive(Debug, Clone)]
pub struct Slice {
    pub name: String,
    pub frame: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    pub pivot: Option<(i32, i32)>,
    pub user_data: Option<UserData>,
}

/// A fully decoded sprite file. Built only by [`Document::decode`]; never partially exposed.
#[derive(Debug, Clone)]
pub struct Document {
    pub mode: ColorMode,
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub transparent_index: u8,
    /// Premultiplied palette colors.
    pub palette: Vec<Rgba<u8>>,
    pub layers: Vec<Layer>,
    pub frames: Vec<Frame>,
    pub tags: Vec<Tag>,
    pub slices: Vec<Slice>,
}

impl Document {
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode::decode(data, &DecodeOptions::default())
    }

    pub fn decode_with(data: &[u8], opts: &DecodeOptions) -> Result<Self> {
        decode::decode(data, opts)
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::decode(&data)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
