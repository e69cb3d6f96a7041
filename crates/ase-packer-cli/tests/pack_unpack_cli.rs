use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};

fn ase_packer(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ase-packer"))
        .args(args)
        .args(["-q", "--progress", "false"])
        .current_dir(cwd)
        .output()
        .expect("run ase-packer")
}

fn frame(dir: &Path, index: u32, color: [u8; 4]) {
    fs::create_dir_all(dir).expect("mkdir");
    RgbaImage::from_pixel(4, 3, Rgba(color))
        .save(dir.join(format!("{index}.png")))
        .expect("png");
}

fn sprite_names(page_json: &Path) -> Vec<String> {
    let doc: serde_json::Value =
        serde_json::from_slice(&fs::read(page_json).expect("read page json")).expect("json");
    doc["sprites"]
        .as_object()
        .expect("sprites map")
        .keys()
        .cloned()
        .collect()
}

#[test]
fn page_root_frames_pack_and_frames_without_metadata_are_skipped() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("input").join("hero_page");
    frame(&page, 0, [255, 0, 0, 255]);
    frame(&page, 1, [0, 255, 0, 255]);
    fs::write(
        page.join("mdat.json"),
        r#"{ "frameCount": 2, "name": "hero" }"#,
    )
    .expect("mdat");
    frame(&page.join("nometa"), 0, [0, 0, 255, 255]);

    let packed = ase_packer(
        &["pack", "-i", "input", "-o", "out", "--size", "64", "--padding", "0"],
        tmp.path(),
    );
    assert!(
        packed.status.success(),
        "pack failed: {}",
        String::from_utf8_lossy(&packed.stderr)
    );
    assert!(tmp.path().join("out/hero_page.png").is_file());
    assert_eq!(sprite_names(&tmp.path().join("out/hero_page.json")), ["hero"]);

    let unpacked = ase_packer(&["unpack", "-i", "out", "-o", "unpacked"], tmp.path());
    assert!(
        unpacked.status.success(),
        "unpack failed: {}",
        String::from_utf8_lossy(&unpacked.stderr)
    );
    let folder = tmp.path().join("unpacked/hero_page");
    assert!(folder.join("hero.aseprite").is_file());
    assert!(folder.join("PageOptions.json").is_file());
    assert!(!folder.join("nometa.aseprite").exists());
}

#[test]
fn broken_sprite_fails_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("input").join("bad_page");
    fs::create_dir_all(&page).expect("mkdir");
    fs::write(page.join("junk.aseprite"), b"not a sprite").expect("write");

    let packed = ase_packer(&["pack", "-i", "input", "-o", "out"], tmp.path());
    assert!(!packed.status.success());
    assert!(!tmp.path().join("out/bad_page.json").exists());
}
