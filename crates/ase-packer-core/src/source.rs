//! Sprite sources consumed by the pack side.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::Deserialize;
use tracing::debug;

use crate::ase::{ATTACH_LAYER_PREFIX, Document, LayerKind, ORIGIN_LAYER_NAME};
use crate::compositing::{mul_un8, opacity, premultiply};
use crate::error::{AsePackerError, Result};
use crate::model::CelImage;

/// Companion file describing a frame directory.
pub const FRAME_DIR_METADATA: &str = "mdat.json";

/// One sprite ready to be cropped and packed.
#[derive(Debug, Clone)]
pub struct SpriteSource {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    /// `[layer][frame]` premultiplied cels in sprite space.
    pub layers: Vec<Vec<CelImage>>,
    pub origin: (i32, i32),
    pub attach_points: BTreeMap<String, Vec<[i32; 2]>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameDirMetadata {
    frame_count: usize,
    name: String,
    #[serde(default)]
    origin: [i32; 2],
    #[serde(default)]
    attach_points: BTreeMap<String, Vec<[i32; 2]>>,
}

impl SpriteSource {
    /// Splits a decoded document into real layers and markers.
    ///
    /// `_origin` supplies the origin from its frame 0 cel; each `_attach_{name}` layer supplies
    /// one point per frame until its first frame without a cel. Every other visible image layer
    /// is a real layer, with cel and layer opacity baked into its pixels.
    pub fn from_document(name: impl Into<String>, doc: &Document) -> Self {
        let name = name.into();
        let mut layers = Vec::new();
        let mut origin = (0, 0);
        let mut attach_points = BTreeMap::new();

        for (index, layer) in doc.layers.iter().enumerate() {
            if layer.name == ORIGIN_LAYER_NAME {
                if let Some(cel) = doc.frames.first().and_then(|f| f.cel_for_layer(index)) {
                    origin = (cel.x, cel.y);
                }
            } else if let Some(point) = layer.name.strip_prefix(ATTACH_LAYER_PREFIX) {
                let points = doc
                    .frames
                    .iter()
                    .map_while(|f| f.cel_for_layer(index).map(|c| [c.x, c.y]))
                    .collect();
                attach_points.insert(point.to_string(), points);
            } else if layer.kind == LayerKind::Normal && layer.is_visible() {
                let cels = doc
                    .frames
                    .iter()
                    .map(|frame| match frame.cel_for_layer(index) {
                        Some(cel) => match &cel.pixels {
                            Some(pixels) => CelImage::new(
                                faded(pixels, opacity(cel.alpha, layer.alpha)),
                                cel.x,
                                cel.y,
                            ),
                            None => CelImage::empty(),
                        },
                        None => CelImage::empty(),
                    })
                    .collect();
                layers.push(cels);
            } else {
                debug!(sprite = %name, layer = %layer.name, "layer not packed");
            }
        }

        Self {
            name,
            width: doc.width,
            height: doc.height,
            frame_count: doc.frame_count(),
            layers,
            origin,
            attach_points,
        }
    }

    /// Decodes an `.ase`/`.aseprite` file; the sprite is named after the file stem.
    pub fn read_ase(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AsePackerError::InvalidInput(format!("no file name in {}", path.display()))
            })?;
        let doc = Document::read_file(path)?;
        Ok(Self::from_document(name, &doc))
    }

    /// Loads a directory of numbered PNG frames (`0.png`, `1.png`, ...) and its `mdat.json`.
    pub fn from_frame_dir(dir: &Path) -> Result<Self> {
        let meta_path = dir.join(FRAME_DIR_METADATA);
        if !meta_path.is_file() {
            return Err(AsePackerError::MissingMetadata {
                path: dir.to_path_buf(),
            });
        }
        let meta: FrameDirMetadata = serde_json::from_slice(&fs::read(&meta_path)?)?;

        let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let index = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| {
                    AsePackerError::InvalidInput(format!(
                        "frame file {} is not numbered",
                        path.display()
                    ))
                })?;
            numbered.push((index, path));
        }
        numbered.sort_by_key(|(index, _)| *index);

        if numbered.is_empty() || numbered.len() != meta.frame_count {
            return Err(AsePackerError::InvalidInput(format!(
                "{} declares {} frames but holds {} PNGs",
                meta_path.display(),
                meta.frame_count,
                numbered.len()
            )));
        }

        let mut frames = Vec::with_capacity(numbered.len());
        for (_, path) in &numbered {
            let mut image = image::open(path)?.to_rgba8();
            for px in image.pixels_mut() {
                *px = premultiply(px[0], px[1], px[2], px[3]);
            }
            frames.push(CelImage::new(image, 0, 0));
        }
        let (width, height) = frames[0].image.dimensions();

        Ok(Self {
            name: meta.name,
            width,
            height,
            frame_count: frames.len(),
            layers: vec![frames],
            origin: (meta.origin[0], meta.origin[1]),
            attach_points: meta.attach_points,
        })
    }
}

/// Scales premultiplied pixels by `opacity`.
fn faded(pixels: &RgbaImage, opacity: u8) -> RgbaImage {
    let mut out = pixels.clone();
    if opacity == 255 {
        return out;
    }
    for px in out.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = mul_un8(*c as i32, opacity as i32) as u8;
        }
    }
    out
}
