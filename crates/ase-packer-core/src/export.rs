//! Page metadata document (`<page>.json`).
//!
//! Shape: `{ "sprites": { name: { P, W, H, L, C?, X, Y, A } }, "options": { ... } }` where `P`
//! holds `[x, y, w, h]` per layer per frame and `C` the matching `[dx, dy]` crop offsets. `C`
//! is left out when every offset is zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PageOptions;
use crate::error::{AsePackerError, Result};
use crate::model::{Rect, Sprite};

/// Wire form of a [`Sprite`]. The name is the key it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpriteRecord {
    #[serde(rename = "P")]
    pub positions: Vec<Vec<[u32; 4]>>,
    #[serde(rename = "W")]
    pub width: u32,
    #[serde(rename = "H")]
    pub height: u32,
    #[serde(rename = "L")]
    pub length: usize,
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub crop_offsets: Option<Vec<Vec<[i32; 2]>>>,
    #[serde(rename = "X")]
    pub origin_x: i32,
    #[serde(rename = "Y")]
    pub origin_y: i32,
    #[serde(rename = "A", default)]
    pub attach_points: BTreeMap<String, Vec<[i32; 2]>>,
}

impl From<&Sprite> for SpriteRecord {
    fn from(s: &Sprite) -> Self {
        Self {
            positions: s
                .positions
                .iter()
                .map(|frames| frames.iter().map(|r| [r.x, r.y, r.w, r.h]).collect())
                .collect(),
            width: s.width,
            height: s.height,
            length: s.length,
            crop_offsets: s.has_crop_offsets().then(|| s.crop_offsets.clone()),
            origin_x: s.origin_x,
            origin_y: s.origin_y,
            attach_points: s.attach_points.clone(),
        }
    }
}

impl SpriteRecord {
    /// Checks table shapes and builds the in-memory sprite. Missing crop offsets load as zeros.
    pub fn into_sprite(self, name: impl Into<String>) -> Result<Sprite> {
        let name = name.into();
        let bad = |what: String| AsePackerError::InvalidInput(format!("sprite '{name}': {what}"));
        for (layer, frames) in self.positions.iter().enumerate() {
            if frames.len() != self.length {
                return Err(bad(format!(
                    "layer {layer} has {} positions, expected {}",
                    frames.len(),
                    self.length
                )));
            }
        }
        let layers = self.positions.len();
        let crop_offsets = match self.crop_offsets {
            Some(offsets) => {
                let shape_ok = offsets.len() == layers
                    && offsets.iter().all(|frames| frames.len() == self.length);
                if !shape_ok {
                    return Err(bad(format!(
                        "crop offsets do not match {layers} layers x {} frames",
                        self.length
                    )));
                }
                offsets
            }
            None => vec![vec![[0, 0]; self.length]; layers],
        };
        if let Some((point, seq)) = self
            .attach_points
            .iter()
            .find(|(_, seq)| seq.len() > self.length)
        {
            return Err(bad(format!(
                "attach point '{point}' has {} frames, sprite has {}",
                seq.len(),
                self.length
            )));
        }

        Ok(Sprite {
            positions: self
                .positions
                .into_iter()
                .map(|frames| {
                    frames
                        .into_iter()
                        .map(|[x, y, w, h]| Rect::new(x, y, w, h))
                        .collect()
                })
                .collect(),
            name,
            width: self.width,
            height: self.height,
            length: self.length,
            layers,
            crop_offsets,
            origin_x: self.origin_x,
            origin_y: self.origin_y,
            attach_points: self.attach_points,
        })
    }
}

/// Top-level page metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDocument {
    pub sprites: BTreeMap<String, SpriteRecord>,
    #[serde(default)]
    pub options: PageOptions,
}

impl PageDocument {
    pub fn new<'a>(options: &PageOptions, sprites: impl IntoIterator<Item = &'a Sprite>) -> Self {
        Self {
            sprites: sprites
                .into_iter()
                .map(|s| (s.name.clone(), SpriteRecord::from(s)))
                .collect(),
            options: options.clone(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Converts every record into a named [`Sprite`].
    pub fn into_sprites(self) -> Result<(PageOptions, BTreeMap<String, Sprite>)> {
        let mut sprites = BTreeMap::new();
        for (name, record) in self.sprites {
            let sprite = record.into_sprite(name.clone())?;
            sprites.insert(name, sprite);
        }
        Ok((self.options, sprites))
    }
}
