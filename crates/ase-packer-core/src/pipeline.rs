use std::collections::BTreeMap;

use image::RgbaImage;
use tracing::{info, instrument, warn};

use crate::config::PageOptions;
use crate::error::{AsePackerError, Result};
use crate::model::Sprite;
use crate::packer::{BinaryTreePacker, Packer};
use crate::page::TexturePage;
use crate::palette::{Palette, index_image};
use crate::source::SpriteSource;
use crate::trim::crop_cel;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything needed to pack one page.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub name: String,
    pub options: PageOptions,
    pub sources: Vec<SpriteSource>,
    /// Per-layer lookup images, used when the page packs indexed sprites.
    pub palettes: Vec<Palette>,
}

/// A cropped layer/frame image waiting for a spot on the page.
struct Candidate {
    sprite: String,
    layer: usize,
    frame: usize,
    image: RgbaImage,
}

#[instrument(skip_all, fields(page = %input.name, sprites = input.sources.len()))]
/// Packs every sprite of `input` onto a single square page.
///
/// Notes:
/// - Each layer/frame is cropped to its opaque bounds first; the crop position is recorded as
///   that cel's crop offset.
/// - Candidates are inserted tallest first. The sort is stable, so ties keep source order.
/// - Running out of space is an error for the whole page.
pub fn pack_page(input: PageInput) -> Result<TexturePage> {
    let PageInput {
        name,
        options,
        sources,
        palettes,
    } = input;
    options.validate()?;

    let mut sprites: BTreeMap<String, Sprite> = BTreeMap::new();
    let mut candidates = Vec::new();
    for source in sources {
        if sprites.contains_key(&source.name) {
            return Err(AsePackerError::InvalidInput(format!(
                "sprite '{}' appears twice on page '{name}'",
                source.name
            )));
        }
        let (sprite, cels) = prepare_sprite(source, &options, &palettes)?;
        candidates.extend(cels);
        sprites.insert(sprite.name.clone(), sprite);
    }

    candidates.sort_by(|a, b| b.image.height().cmp(&a.image.height()));

    let mut packer = BinaryTreePacker::new(options.size, options.padding);
    for c in candidates {
        let (width, height) = c.image.dimensions();
        let rect = packer
            .insert(c.image)
            .ok_or_else(|| AsePackerError::PackingOverflow {
                page: name.clone(),
                sprite: c.sprite.clone(),
                layer: c.layer,
                frame: c.frame,
                width,
                height,
            })?;
        if let Some(sprite) = sprites.get_mut(&c.sprite) {
            sprite.positions[c.layer][c.frame] = rect;
        }
    }

    let mut texture = RgbaImage::new(options.size, options.size);
    packer.render(&mut texture);

    let page = TexturePage {
        name,
        options,
        texture,
        palettes,
        sprites,
    };
    info!("{}", page.stats().summary());
    Ok(page)
}

/// Packs independent pages, in parallel with the `parallel` feature. Results keep input order.
pub fn pack_pages(inputs: Vec<PageInput>) -> Vec<Result<TexturePage>> {
    #[cfg(feature = "parallel")]
    {
        inputs.into_par_iter().map(pack_page).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        inputs.into_iter().map(pack_page).collect()
    }
}

fn prepare_sprite(
    source: SpriteSource,
    options: &PageOptions,
    palettes: &[Palette],
) -> Result<(Sprite, Vec<Candidate>)> {
    if source.frame_count == 0 {
        return Err(AsePackerError::InvalidInput(format!(
            "sprite '{}' has no frames",
            source.name
        )));
    }
    if let Some((layer, cels)) = source
        .layers
        .iter()
        .enumerate()
        .find(|(_, cels)| cels.len() != source.frame_count)
    {
        return Err(AsePackerError::InvalidInput(format!(
            "sprite '{}' layer {layer} has {} frames, expected {}",
            source.name,
            cels.len(),
            source.frame_count
        )));
    }

    let indexed = options.is_indexed(&source.name);
    let mut sprite = Sprite::new(
        source.name.clone(),
        source.width,
        source.height,
        source.layers.len(),
        source.frame_count,
    );
    sprite.origin_x = source.origin.0;
    sprite.origin_y = source.origin.1;
    sprite.attach_points = source.attach_points;

    let mut candidates = Vec::with_capacity(sprite.layers * sprite.length);
    for (layer, cels) in source.layers.iter().enumerate() {
        for (frame, cel) in cels.iter().enumerate() {
            let mut cropped = crop_cel(cel);
            sprite.crop_offsets[layer][frame] = [cropped.x, cropped.y];
            if indexed {
                let palette = palettes.get(layer).ok_or_else(|| {
                    AsePackerError::InvalidInput(format!(
                        "sprite '{}' layer {layer} is indexed but the page has {} palettes",
                        source.name,
                        palettes.len()
                    ))
                })?;
                let far = index_image(
                    &mut cropped.image,
                    palette,
                    options.indexing_equality_threshold,
                )?;
                if far > 0 {
                    warn!(
                        sprite = %source.name,
                        layer,
                        frame,
                        pixels = far,
                        "colors outside the palette threshold"
                    );
                }
            }
            candidates.push(Candidate {
                sprite: source.name.clone(),
                layer,
                frame,
                image: cropped.image,
            });
        }
    }
    Ok((sprite, candidates))
}
