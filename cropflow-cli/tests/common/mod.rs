//! Common helpers for CLI integration tests.

use std::path::PathBuf;

/// Locate a SeetaFace model for end-to-end tests.
///
/// Checks `CROPFLOW_SEETA_MODEL` first, then the conventional repo paths.
/// Tests that need real detection skip when no model is available.
pub fn find_model_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CROPFLOW_SEETA_MODEL") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    let candidates = [
        "models/seeta_fd_frontal_v1.0.bin",
        "../models/seeta_fd_frontal_v1.0.bin",
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Write a synthetic portrait-sized test image.
#[allow(dead_code)]
pub fn write_test_image(path: &std::path::Path, width: u32, height: u32) {
    let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([180, 170, 160, 255]));
    // A darker block roughly where a face would be, so the image is not flat.
    for y in height / 4..height / 2 {
        for x in width / 3..(2 * width) / 3 {
            img.put_pixel(x, y, image::Rgba([90, 70, 60, 255]));
        }
    }
    img.save(path).expect("save test image");
}

/// Run the CLI binary with the given arguments.
pub fn run_cli(args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_cropflow-cli"))
        .args(args)
        .output()
        .expect("execute CLI")
}
