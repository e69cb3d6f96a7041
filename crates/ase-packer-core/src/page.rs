//! Packed pages on disk: `<page>.png` + `<page>.json`, and the unpack path back to sprite files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::{RgbaImage, imageops};
use tracing::{debug, info, instrument};

use crate::ase::encode::{DEFAULT_FRAME_DURATION_MS, EncodeRequest, encode};
use crate::config::PageOptions;
use crate::error::{AsePackerError, Result};
use crate::export::PageDocument;
use crate::model::{CelImage, PackStats, Sprite};
use crate::palette::{Palette, deindex_image};

/// File written into every unpacked page folder.
pub const PAGE_OPTIONS_FILE: &str = "PageOptions.json";
/// Sub-directory holding palette lookup images for indexed pages.
pub const PALETTES_DIR: &str = "palettes";
/// Extension of regenerated sprite files.
pub const SPRITE_EXTENSION: &str = "aseprite";

/// One packed page: texture, options, palettes and sprite placements.
#[derive(Debug, Clone)]
pub struct TexturePage {
    pub name: String,
    pub options: PageOptions,
    /// Premultiplied page texture, `size x size`.
    pub texture: RgbaImage,
    /// Per-layer lookup images for indexed sprites.
    pub palettes: Vec<Palette>,
    pub sprites: BTreeMap<String, Sprite>,
}

impl TexturePage {
    pub fn document(&self) -> PageDocument {
        PageDocument::new(&self.options, self.sprites.values())
    }

    pub fn stats(&self) -> PackStats {
        PackStats::from_sprites(self.options.size, self.sprites.values())
    }

    /// Writes `<dir>/<name>.png` and `<dir>/<name>.json`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.texture.save(dir.join(format!("{}.png", self.name)))?;
        fs::write(
            dir.join(format!("{}.json", self.name)),
            self.document().to_json()?,
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(page = name))]
    /// Reads `<dir>/<name>.json` and `<dir>/<name>.png`. Palettes are not loaded.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let doc = PageDocument::from_json(&fs::read(dir.join(format!("{name}.json")))?)?;
        let (options, sprites) = doc.into_sprites()?;
        let texture = image::open(dir.join(format!("{name}.png")))?.to_rgba8();
        debug!(sprites = sprites.len(), "page loaded");
        Ok(Self {
            name: name.to_string(),
            options,
            texture,
            palettes: Vec::new(),
            sprites,
        })
    }

    /// Replaces the page's palettes with [`read_palettes`] from `dir`. Returns how many were
    /// loaded.
    pub fn load_palettes(&mut self, dir: &Path) -> Result<usize> {
        self.palettes = read_palettes(dir, &self.name)?;
        Ok(self.palettes.len())
    }

    /// Cuts a sprite's cels back out of the texture, `[layer][frame]`, positioned at their
    /// crop offsets and mapped back through the palettes when the sprite is indexed.
    pub fn unpack_sprite(&self, sprite: &Sprite) -> Result<Vec<Vec<CelImage>>> {
        let indexed = self.options.is_indexed(&sprite.name);
        let (tw, th) = self.texture.dimensions();
        let mut layers = Vec::with_capacity(sprite.layers);
        for (layer, frames) in sprite.positions.iter().enumerate() {
            let palette = if indexed {
                Some(self.palettes.get(layer).ok_or_else(|| {
                    AsePackerError::InvalidInput(format!(
                        "sprite '{}' layer {layer} is indexed but page '{}' has {} palettes",
                        sprite.name,
                        self.name,
                        self.palettes.len()
                    ))
                })?)
            } else {
                None
            };
            let mut cels = Vec::with_capacity(frames.len());
            for (frame, rect) in frames.iter().enumerate() {
                let inside = rect.x as u64 + rect.w as u64 <= tw as u64
                    && rect.y as u64 + rect.h as u64 <= th as u64;
                if !inside {
                    return Err(AsePackerError::InvalidInput(format!(
                        "sprite '{}' layer {layer} frame {frame} lies outside the {tw}x{th} texture",
                        sprite.name
                    )));
                }
                let mut image =
                    imageops::crop_imm(&self.texture, rect.x, rect.y, rect.w, rect.h).to_image();
                if let Some(palette) = palette {
                    deindex_image(&mut image, palette);
                }
                let [x, y] = sprite.crop_offsets[layer][frame];
                cels.push(CelImage::new(image, x, y));
            }
            layers.push(cels);
        }
        Ok(layers)
    }

    /// Regenerates one sprite file.
    pub fn encode_sprite(&self, sprite: &Sprite) -> Result<Vec<u8>> {
        let layers = self.unpack_sprite(sprite)?;
        encode(&EncodeRequest {
            width: sprite.width,
            height: sprite.height,
            frame_count: sprite.length,
            layers: &layers,
            attach_points: &sprite.attach_points,
            origin: (sprite.origin_x, sprite.origin_y),
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        })
    }

    #[instrument(skip_all, fields(page = %self.name, sprites = self.sprites.len()))]
    /// Recreates `<out>/<page>/` from scratch with `PageOptions.json` and one sprite file per
    /// sprite. Returns the folder path.
    pub fn write_to_folder(&self, out: &Path) -> Result<PathBuf> {
        let folder = out.join(&self.name);
        if folder.exists() {
            fs::remove_dir_all(&folder)?;
        }
        fs::create_dir_all(&folder)?;
        fs::write(
            folder.join(PAGE_OPTIONS_FILE),
            serde_json::to_vec_pretty(&self.options)?,
        )?;

        for sprite in self.sprites.values() {
            let path = folder.join(format!("{}.{SPRITE_EXTENSION}", sprite.name));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, self.encode_sprite(sprite)?)?;
            debug!(sprite = %sprite.name, "sprite written");
        }
        Ok(folder)
    }
}

/// Reads the lookup images in `dir` whose file name starts with `page`, in lexical order; the
/// n-th file becomes the palette of layer n.
pub fn read_palettes(dir: &Path, page: &str) -> Result<Vec<Palette>> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && file_name.starts_with(page) {
            files.push((file_name.to_string(), path.clone()));
        }
    }
    files.sort();

    let mut palettes = Vec::with_capacity(files.len());
    for (index, (file_name, path)) in files.iter().enumerate() {
        let lookup = image::open(path)?.to_rgba8();
        palettes.push(Palette::from_lookup(&lookup));
        info!(page, palette = %file_name, index, "palette loaded");
    }
    Ok(palettes)
}
