//! Core library for packing Aseprite sprites into texture atlases and back.
//!
//! - Codec: `ase` decodes `.ase`/`.aseprite` files into a [`Document`] and encodes sprites back
//! - Packing: `pipeline::pack_page` crops every layer/frame, places it with a binary-tree packer
//!   and renders an extruded page texture
//! - Model: [`TexturePage`] and [`Sprite`] hold placements, crop offsets and markers; the page
//!   metadata document is serde-serializable
//!
//! Quick example:
//! ```ignore
//! use std::path::Path;
//! use ase_packer_core::prelude::*;
//! # fn main() -> ase_packer_core::Result<()> {
//! let source = SpriteSource::read_ase(Path::new("hero.aseprite"))?;
//! let page = pack_page(PageInput {
//!     name: "characters".into(),
//!     options: PageOptions::default(),
//!     sources: vec![source],
//!     palettes: Vec::new(),
//! })?;
//! page.save(Path::new("out"))?;
//! let loaded = TexturePage::load(Path::new("out"), "characters")?;
//! loaded.write_to_folder(Path::new("unpacked"))?;
//! # Ok(()) }
//! ```

pub mod ase;
pub mod compositing;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod packer;
pub mod page;
pub mod palette;
pub mod pipeline;
pub mod source;
pub mod trim;

pub use ase::{DecodeOptions, Document};
pub use config::*;
pub use error::*;
pub use export::*;
pub use model::*;
pub use packer::*;
pub use page::*;
pub use pipeline::*;
pub use source::*;

/// Convenience prelude for common types and functions.
/// Importing `ase_packer_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::ase::{DecodeOptions, Document, EncodeRequest, encode};
    pub use crate::config::{PageOptions, PageOptionsBuilder};
    pub use crate::error::{AsePackerError, Result};
    pub use crate::model::{CelImage, PackStats, Rect, Sprite};
    pub use crate::packer::{BinaryTreePacker, Packer};
    pub use crate::page::TexturePage;
    pub use crate::palette::Palette;
    pub use crate::pipeline::{PageInput, pack_page, pack_pages};
    pub use crate::source::SpriteSource;
}
