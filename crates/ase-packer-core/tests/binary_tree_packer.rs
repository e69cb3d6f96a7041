use ase_packer_core::model::Rect;
use ase_packer_core::packer::{BinaryTreePacker, Packer};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn padded(r: &Rect, padding: u32) -> Rect {
    Rect::new(
        r.x - padding / 2,
        r.y - padding / 2,
        r.w + padding,
        r.h + padding,
    )
}

#[test]
fn random_placements_stay_inside_and_disjoint() {
    for padding in [0u32, 1, 2, 4] {
        let mut rng = StdRng::seed_from_u64(100 + padding as u64);
        let size = 256;
        let page = Rect::new(0, 0, size, size);
        let mut sizes: Vec<(u32, u32)> = (0..120)
            .map(|_| (rng.gen_range(1..24), rng.gen_range(1..24)))
            .collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1));

        let mut packer = BinaryTreePacker::new(size, padding);
        let mut placed: Vec<Rect> = Vec::new();
        for (w, h) in sizes {
            if let Some(r) = packer.insert(RgbaImage::new(w, h)) {
                assert_eq!((r.w, r.h), (w, h));
                let footprint = padded(&r, padding);
                assert!(page.contains(&footprint), "{footprint:?} leaves the page");
                for other in &placed {
                    assert!(
                        !footprint.overlaps(&padded(other, padding)),
                        "{r:?} overlaps {other:?} with padding {padding}"
                    );
                }
                placed.push(r);
            }
        }
        assert!(!placed.is_empty());
        assert_eq!(packer.len(), placed.len());
    }
}

#[test]
fn first_placement_is_offset_by_half_padding() {
    let mut packer = BinaryTreePacker::new(64, 4);
    assert!(packer.is_empty());
    let r = packer.insert(RgbaImage::new(10, 6)).expect("fits");
    assert_eq!(r, Rect::new(2, 2, 10, 6));
}

#[test]
fn right_strip_is_tried_before_the_area_below() {
    let mut packer = BinaryTreePacker::new(16, 0);
    assert_eq!(packer.insert(RgbaImage::new(8, 8)), Some(Rect::new(0, 0, 8, 8)));
    assert_eq!(packer.insert(RgbaImage::new(8, 8)), Some(Rect::new(8, 0, 8, 8)));
    assert_eq!(packer.insert(RgbaImage::new(16, 8)), Some(Rect::new(0, 8, 16, 8)));
    assert_eq!(packer.insert(RgbaImage::new(1, 1)), None);
}

#[test]
fn oversized_images_are_refused() {
    let mut packer = BinaryTreePacker::new(16, 2);
    assert_eq!(packer.insert(RgbaImage::new(15, 4)), None);
    assert_eq!(packer.insert(RgbaImage::new(4, 15)), None);
    assert!(packer.insert(RgbaImage::new(14, 14)).is_some());
    assert_eq!(packer.insert(RgbaImage::new(1, 1)), None);
}

#[test]
fn render_extrudes_edges_into_the_gutter() {
    let red = Rgba([255, 0, 0, 255]);
    let mut packer = BinaryTreePacker::new(8, 2);
    let r = packer
        .insert(RgbaImage::from_pixel(2, 2, red))
        .expect("fits");
    assert_eq!(r, Rect::new(1, 1, 2, 2));

    let mut canvas = RgbaImage::new(8, 8);
    packer.render(&mut canvas);
    let clear = Rgba([0, 0, 0, 0]);
    for (x, y, px) in canvas.enumerate_pixels() {
        let in_x = (1..=2).contains(&x);
        let in_y = (1..=2).contains(&y);
        let content = in_x && in_y;
        let edge = (in_x && (y == 0 || y == 3)) || (in_y && (x == 0 || x == 3));
        if content || edge {
            assert_eq!(*px, red, "({x},{y})");
        } else {
            assert_eq!(*px, clear, "({x},{y}) should stay clear");
        }
    }
}

#[test]
fn small_padding_does_not_extrude() {
    let blue = Rgba([0, 0, 255, 255]);
    let mut packer = BinaryTreePacker::new(8, 1);
    let r = packer
        .insert(RgbaImage::from_pixel(2, 2, blue))
        .expect("fits");
    assert_eq!((r.x, r.y), (0, 0));

    let mut canvas = RgbaImage::new(8, 8);
    packer.render(&mut canvas);
    let painted = canvas.pixels().filter(|p| p[3] != 0).count();
    assert_eq!(painted, 4);
}

#[test]
fn rendered_pixels_match_their_rects() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut packer = BinaryTreePacker::new(64, 2);
    let mut placed = Vec::new();
    for i in 0..10u8 {
        let color = Rgba([i * 20, rng.r#gen(), 255 - i, 255]);
        let (w, h) = (rng.gen_range(2..10), rng.gen_range(2..10));
        if let Some(r) = packer.insert(RgbaImage::from_pixel(w, h, color)) {
            placed.push((r, color));
        }
    }
    let mut canvas = RgbaImage::new(64, 64);
    packer.render(&mut canvas);
    for (r, color) in placed {
        for y in r.y..r.y + r.h {
            for x in r.x..r.x + r.w {
                assert_eq!(*canvas.get_pixel(x, y), color);
            }
        }
    }
}
