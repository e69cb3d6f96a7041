use ase_packer_core::ase::bytes::ByteWriter;
use ase_packer_core::ase::{ColorMode, DecodeOptions, Document, LayerFlags, LoopDirection, chunk};
use ase_packer_core::error::AsePackerError;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::Rgba;
use std::io::Write;

const VISIBLE: u16 = 0x3;
const HIDDEN: u16 = 0x2;

fn file(width: u16, height: u16, depth: u16, flags: u32, frames: &[Vec<(u16, Vec<u8>)>]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    let size = w.reserve_u32();
    w.u16(0xA5E0);
    w.u16(frames.len() as u16);
    w.u16(width);
    w.u16(height);
    w.u16(depth);
    w.u32(flags);
    w.u16(0);
    w.zeros(8);
    w.u8(0);
    w.zeros(3);
    w.u16(0);
    w.zeros(94);
    for chunks in frames {
        let frame = w.reserve_u32();
        w.u16(0xF1FA);
        w.u16(chunks.len() as u16);
        w.u16(100);
        w.zeros(2);
        w.u32(chunks.len() as u32);
        for (kind, body) in chunks {
            w.u32(body.len() as u32 + 6);
            w.u16(*kind);
            w.bytes(body);
        }
        w.patch_span(frame).unwrap();
    }
    w.patch_span(size).unwrap();
    w.into_inner()
}

fn layer(name: &str, flags: u16, opacity: u8) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u16(flags);
    w.u16(0);
    w.u16(0);
    w.u16(0);
    w.u16(0);
    w.u16(0);
    w.u8(opacity);
    w.zeros(3);
    w.string(name).unwrap();
    (chunk::LAYER, w.into_inner())
}

fn raw_cel(layer: u16, x: i16, y: i16, width: u16, height: u16, data: &[u8]) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u16(layer);
    w.i16(x);
    w.i16(y);
    w.u8(255);
    w.u16(0);
    w.i16(0);
    w.zeros(5);
    w.u16(width);
    w.u16(height);
    w.bytes(data);
    (chunk::CEL, w.into_inner())
}

fn zlib_cel(layer: u16, width: u16, height: u16, data: &[u8]) -> (u16, Vec<u8>) {
    let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
    z.write_all(data).unwrap();
    let mut w = ByteWriter::new();
    w.u16(layer);
    w.i16(0);
    w.i16(0);
    w.u8(255);
    w.u16(2);
    w.i16(0);
    w.zeros(5);
    w.u16(width);
    w.u16(height);
    w.bytes(&z.finish().unwrap());
    (chunk::CEL, w.into_inner())
}

fn user_text(text: &str) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u32(1);
    w.string(text).unwrap();
    (chunk::USER_DATA, w.into_inner())
}

fn user_color(rgba: [u8; 4]) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u32(2);
    w.bytes(&rgba);
    (chunk::USER_DATA, w.into_inner())
}

fn palette(new_size: u32, first: u32, colors: &[[u8; 4]]) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u32(new_size);
    w.u32(first);
    w.u32(first + colors.len() as u32 - 1);
    w.zeros(8);
    for c in colors {
        w.u16(0);
        w.bytes(c);
    }
    (chunk::PALETTE, w.into_inner())
}

fn slice(name: &str, x: i32, y: i32, pivot: Option<(i32, i32)>) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u32(1);
    w.u32(if pivot.is_some() { 3 } else { 1 });
    w.u32(0);
    w.string(name).unwrap();
    w.u32(0);
    w.i32(x);
    w.i32(y);
    w.u32(4);
    w.u32(5);
    // nine-slice center, discarded
    w.i32(1);
    w.i32(1);
    w.u32(2);
    w.u32(2);
    if let Some((px, py)) = pivot {
        w.i32(px);
        w.i32(py);
    }
    (chunk::SLICE, w.into_inner())
}

/// Slice with one key per `(frame, x, y)`, no nine-slice or pivot data.
fn slice_keys(name: &str, keys: &[(u32, i32, i32)]) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u32(keys.len() as u32);
    w.u32(0);
    w.u32(0);
    w.string(name).unwrap();
    for (frame, x, y) in keys {
        w.u32(*frame);
        w.i32(*x);
        w.i32(*y);
        w.u32(8);
        w.u32(8);
    }
    (chunk::SLICE, w.into_inner())
}

fn tags(entries: &[(&str, u16, u16, u8)]) -> (u16, Vec<u8>) {
    let mut w = ByteWriter::new();
    w.u16(entries.len() as u16);
    w.zeros(8);
    for (name, from, to, dir) in entries {
        w.u16(*from);
        w.u16(*to);
        w.u8(*dir);
        w.zeros(8);
        w.bytes(&[10, 20, 30]);
        w.zeros(1);
        w.string(name).unwrap();
    }
    (chunk::TAGS, w.into_inner())
}

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn solid(n: usize, px: [u8; 4]) -> Vec<u8> {
    px.iter().copied().cycle().take(n * 4).collect()
}

fn simple_file() -> Vec<u8> {
    file(2, 2, 32, 1, &[vec![layer("base", VISIBLE, 255), raw_cel(0, 0, 0, 2, 2, &solid(4, RED))]])
}

#[test]
fn decodes_minimal_rgba_file() {
    let doc = Document::decode(&simple_file()).expect("decode");
    assert_eq!(doc.mode, ColorMode::Rgba);
    assert_eq!((doc.width, doc.height), (2, 2));
    assert_eq!(doc.frame_count(), 1);
    assert_eq!(doc.layers[0].name, "base");
    assert!(doc.layers[0].flags.contains(LayerFlags::VISIBLE));
    assert_eq!(doc.palette.len(), 256);
    assert_eq!(doc.frames[0].duration, 100);
    assert!(doc.frames[0].pixels.pixels().all(|p| *p == Rgba(RED)));
}

#[test]
fn bad_magic_is_a_format_error() {
    let mut data = simple_file();
    data[4] = 0;
    match Document::decode(&data) {
        Err(AsePackerError::Format { offset, .. }) => assert_eq!(offset, 4),
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn truncated_streams_fail_without_a_document() {
    let data = simple_file();
    for cut in [0, 10, 127, 128, 140, data.len() - 1] {
        let res = Document::decode(&data[..cut]);
        assert!(
            matches!(res, Err(AsePackerError::Format { .. })),
            "cut at {cut} should fail with a format error"
        );
    }
}

#[test]
fn chunk_length_past_frame_end_is_rejected() {
    let mut data = simple_file();
    // first chunk header starts right after the 128-byte header and 16-byte frame header
    let at = 128 + 16;
    data[at..at + 4].copy_from_slice(&10_000u32.to_le_bytes());
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn unknown_chunks_are_skipped() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![
            (0x7777, vec![1, 2, 3, 4, 5]),
            layer("base", VISIBLE, 255),
            (chunk::COLOR_PROFILE, vec![0; 16]),
            raw_cel(0, 0, 0, 2, 2, &solid(4, RED)),
        ]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.layers.len(), 1);
    assert!(doc.frames[0].pixels.pixels().all(|p| *p == Rgba(RED)));
}

#[test]
fn cel_on_undefined_layer_is_a_format_error() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), raw_cel(3, 0, 0, 2, 2, &solid(4, RED))]],
    );
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn hidden_layers_never_contribute_pixels() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![
            layer("base", VISIBLE, 255),
            layer("ghost", HIDDEN, 255),
            raw_cel(0, 0, 0, 1, 1, &RED),
            raw_cel(1, 0, 0, 2, 2, &solid(4, BLUE)),
        ]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.layers[1].alpha, 0.0);
    let px = &doc.frames[0].pixels;
    assert_eq!(*px.get_pixel(0, 0), Rgba(RED));
    assert_eq!(*px.get_pixel(1, 0), Rgba([0, 0, 0, 0]));
    assert_eq!(*px.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    // the cel is still recorded with its pixels
    assert!(doc.frames[0].cels[1].pixels.is_some());
}

#[test]
fn layer_opacity_ignored_without_header_flag() {
    let frames = [vec![layer("base", VISIBLE, 0), raw_cel(0, 0, 0, 1, 1, &RED)]];
    let doc = Document::decode(&file(1, 1, 32, 0, &frames)).expect("decode");
    assert_eq!(doc.layers[0].alpha, 1.0);
    assert_eq!(*doc.frames[0].pixels.get_pixel(0, 0), Rgba(RED));

    let doc = Document::decode(&file(1, 1, 32, 1, &frames)).expect("decode");
    assert_eq!(doc.layers[0].alpha, 0.0);
    assert_eq!(*doc.frames[0].pixels.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
}

#[test]
fn indexed_zero_keeps_lower_layers() {
    let data = file(
        2,
        1,
        8,
        1,
        &[vec![
            palette(3, 0, &[[9, 9, 9, 255], RED, BLUE]),
            layer("base", VISIBLE, 255),
            layer("top", VISIBLE, 255),
            raw_cel(0, 0, 0, 2, 1, &[1, 1]),
            raw_cel(1, 0, 0, 2, 1, &[0, 2]),
        ]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.mode, ColorMode::Indexed);
    let px = &doc.frames[0].pixels;
    assert_eq!(*px.get_pixel(0, 0), Rgba(RED));
    assert_eq!(*px.get_pixel(1, 0), Rgba(BLUE));
}

#[test]
fn palette_partial_update_and_growth() {
    let data = file(
        1,
        1,
        8,
        1,
        &[vec![
            palette(300, 298, &[[1, 2, 3, 255], [4, 5, 6, 255]]),
            palette(300, 1, &[[200, 0, 0, 128]]),
        ]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.palette.len(), 300);
    assert_eq!(doc.palette[298], Rgba([1, 2, 3, 255]));
    assert_eq!(doc.palette[299], Rgba([4, 5, 6, 255]));
    assert_eq!(doc.palette[1], Rgba([100, 0, 0, 128]));
    assert_eq!(doc.palette[2], Rgba([0, 0, 0, 0]));
}

#[test]
fn grayscale_pixels() {
    let data = file(
        1,
        1,
        16,
        1,
        &[vec![layer("base", VISIBLE, 255), raw_cel(0, 0, 0, 1, 1, &[100, 255])]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.mode, ColorMode::Grayscale);
    assert_eq!(*doc.frames[0].pixels.get_pixel(0, 0), Rgba([100, 100, 100, 255]));
}

#[test]
fn unsupported_depth_is_rejected() {
    let data = file(1, 1, 24, 1, &[vec![]]);
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn user_data_goes_to_the_most_recent_entity() {
    let data = file(
        2,
        2,
        32,
        1,
        &[
            vec![
                layer("base", VISIBLE, 255),
                user_text("layer note"),
                raw_cel(0, 0, 0, 1, 1, &RED),
                user_color([255, 255, 255, 255]),
                slice("hitbox", -1, 2, Some((3, 4))),
                user_text("slice note"),
            ],
            vec![user_text("orphan"), raw_cel(0, 1, 1, 1, 1, &RED)],
        ],
    );
    let doc = Document::decode(&data).expect("decode");
    let layer_data = doc.layers[0].user_data.as_ref().expect("layer user data");
    assert_eq!(layer_data.text.as_deref(), Some("layer note"));
    assert_eq!(layer_data.color, None);

    let cel_data = doc.frames[0].cels[0].user_data.as_ref().expect("cel user data");
    assert_eq!(cel_data.color, Some(Rgba([255, 255, 255, 255])));

    let slice = &doc.slices[0];
    assert_eq!(slice.name, "hitbox");
    assert_eq!((slice.origin_x, slice.origin_y), (-1, 2));
    assert_eq!((slice.width, slice.height), (4, 5));
    assert_eq!(slice.pivot, Some((3, 4)));
    assert_eq!(
        slice.user_data.as_ref().and_then(|u| u.text.as_deref()),
        Some("slice note")
    );

    // user data at the start of a frame has no owner
    assert_eq!(layer_data.text.as_deref(), Some("layer note"));
    assert!(doc.frames[1].cels[0].user_data.is_none());
}

#[test]
fn tags_are_parsed() {
    let data = file(
        1,
        1,
        32,
        1,
        &[
            vec![tags(&[("walk", 0, 1, 0), ("idle", 1, 1, 2), ("odd", 0, 0, 9)])],
            vec![],
        ],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.tags.len(), 3);
    assert_eq!(doc.tags[0].name, "walk");
    assert_eq!((doc.tags[0].from, doc.tags[0].to), (0, 1));
    assert_eq!(doc.tags[1].direction, LoopDirection::PingPong);
    assert_eq!(doc.tags[2].direction, LoopDirection::Forward);
    assert_eq!(doc.tags[0].color, Rgba([10, 20, 30, 255]));
}

#[test]
fn cels_outside_the_canvas_are_clipped() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), raw_cel(0, -1, 1, 2, 2, &solid(4, RED))]],
    );
    let doc = Document::decode(&data).expect("decode");
    let px = &doc.frames[0].pixels;
    assert_eq!(*px.get_pixel(0, 1), Rgba(RED));
    assert_eq!(*px.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    assert_eq!(*px.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
}

#[test]
fn structure_only_decode_skips_pixels() {
    let opts = DecodeOptions { load_pixels: false };
    let doc = Document::decode_with(&simple_file(), &opts).expect("decode");
    let cel = &doc.frames[0].cels[0];
    assert!(cel.pixels.is_none());
    assert_eq!((cel.width, cel.height), (2, 2));
    assert!(doc.frames[0].pixels.pixels().all(|p| p[3] == 0));
}

#[test]
fn short_raw_cel_is_a_format_error() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), raw_cel(0, 0, 0, 2, 2, &RED)]],
    );
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn oversized_raw_cel_fails_before_allocating() {
    let data = file(
        1,
        1,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), raw_cel(0, 0, 0, 65535, 65535, &RED)]],
    );
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn compressed_cel_decodes() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), zlib_cel(0, 2, 2, &solid(4, BLUE))]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert!(doc.frames[0].pixels.pixels().all(|p| *p == Rgba(BLUE)));
}

#[test]
fn compressed_cel_claiming_huge_size_is_a_format_error() {
    let data = file(
        1,
        1,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), zlib_cel(0, 65535, 65535, &RED)]],
    );
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn compressed_cel_inflating_short_is_a_format_error() {
    let data = file(
        2,
        2,
        32,
        1,
        &[vec![layer("base", VISIBLE, 255), zlib_cel(0, 2, 2, &solid(3, RED))]],
    );
    assert!(matches!(
        Document::decode(&data),
        Err(AsePackerError::Format { .. })
    ));
}

#[test]
fn every_slice_key_is_kept() {
    let data = file(
        16,
        16,
        32,
        1,
        &[
            vec![
                slice_keys("hurt", &[(0, 1, 2), (1, 7, 3)]),
                user_text("last key"),
            ],
            vec![],
        ],
    );
    let doc = Document::decode(&data).expect("decode");
    assert_eq!(doc.slices.len(), 2);
    assert!(doc.slices.iter().all(|s| s.name == "hurt" && s.pivot.is_none()));
    assert_eq!((doc.slices[0].frame, doc.slices[0].origin_x), (0, 1));
    assert_eq!((doc.slices[1].frame, doc.slices[1].origin_x), (1, 7));
    assert!(doc.slices[0].user_data.is_none());
    assert_eq!(
        doc.slices[1].user_data.as_ref().and_then(|u| u.text.as_deref()),
        Some("last key")
    );
}

#[test]
fn slice_without_keys_adds_nothing() {
    let data = file(
        4,
        4,
        32,
        1,
        &[vec![
            layer("base", VISIBLE, 255),
            slice_keys("empty", &[]),
            user_text("still the layer"),
        ]],
    );
    let doc = Document::decode(&data).expect("decode");
    assert!(doc.slices.is_empty());
    assert_eq!(
        doc.layers[0].user_data.as_ref().and_then(|u| u.text.as_deref()),
        Some("still the layer")
    );
}

#[test]
fn chunk_names_cover_known_kinds() {
    assert_eq!(chunk::name(chunk::TILESET), "tileset");
    assert_eq!(chunk::name(chunk::COLOR_PROFILE), "color profile");
    assert_eq!(chunk::name(chunk::OLD_PALETTE_B), "old palette");
    assert_eq!(chunk::name(0x7777), "unknown");
}
