use std::path::PathBuf;

use image::{Rgba, RgbaImage};
use tempfile::tempdir;

fn exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dpblast"))
}

#[test]
fn cli_composes_and_writes_png() {
    let tmp = tempdir().unwrap();
    let assets = tmp.path().join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    RgbaImage::new(40, 60)
        .save(assets.join("1styear.png"))
        .unwrap();
    let photo = tmp.path().join("me.png");
    RgbaImage::from_pixel(80, 40, Rgba([1, 2, 3, 255]))
        .save(&photo)
        .unwrap();
    let config = tmp.path().join("config.yaml");
    std::fs::write(
        &config,
        format!("asset-root: \"{}\"\n", assets.display()),
    )
    .unwrap();
    let out_dir = tmp.path().join("out");

    let output = std::process::Command::new(exe())
        .arg("--config")
        .arg(&config)
        .arg("--photo")
        .arg(&photo)
        .args(["--zoom", "2.0"])
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let written = PathBuf::from(printed);
    assert!(written.starts_with(&out_dir));
    let img = image::open(&written).unwrap();
    assert_eq!((img.width(), img.height()), (40, 60));
}

#[test]
fn cli_rejects_non_image_upload() {
    let tmp = tempdir().unwrap();
    let assets = tmp.path().join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    RgbaImage::new(4, 4).save(assets.join("1styear.png")).unwrap();
    let notes = tmp.path().join("notes.txt");
    std::fs::write(&notes, b"not a photo").unwrap();
    let config = tmp.path().join("config.yaml");
    std::fs::write(
        &config,
        format!("asset-root: \"{}\"\n", assets.display()),
    )
    .unwrap();

    let output = std::process::Command::new(exe())
        .arg("--config")
        .arg(&config)
        .arg("--photo")
        .arg(&notes)
        .arg("--out-dir")
        .arg(tmp.path().join("out"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("image file"));
}

#[test]
fn cli_frame_flag_selects_configured_frame() {
    let tmp = tempdir().unwrap();
    let assets = tmp.path().join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    RgbaImage::new(40, 60).save(assets.join("1styear.png")).unwrap();
    RgbaImage::new(20, 30).save(assets.join("2ndyear.png")).unwrap();
    let photo = tmp.path().join("me.png");
    RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]))
        .save(&photo)
        .unwrap();
    let config = tmp.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "asset-root: \"{}\"\nframes: [\"1styear.png\", \"2ndyear.png\"]\n",
            assets.display()
        ),
    )
    .unwrap();
    let out_dir = tmp.path().join("out");

    let run = |frame: &str| {
        std::process::Command::new(exe())
            .arg("--config")
            .arg(&config)
            .arg("--photo")
            .arg(&photo)
            .args(["--frame", frame])
            .arg("--out-dir")
            .arg(&out_dir)
            .output()
            .unwrap()
    };

    let output = run("2ndyear.png");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let img = image::open(printed).unwrap();
    assert_eq!((img.width(), img.height()), (20, 30));

    let output = run("3rdyear.png");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("default-frame"));
}
