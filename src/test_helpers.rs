//! Shared test utilities for the sitepipe test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let project = setup_project();
//! let (pipeline, events) = test_pipeline(project.path(), TaskId::Build);
//! pipeline.run(&registry().unwrap(), TaskId::Build).unwrap();
//! ```

use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc;
use tempfile::TempDir;

use crate::config::load_config;
use crate::layout::Layout;
use crate::tasks::{Pipeline, PipelineEvent, TaskId};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/project/` to a temp directory and return it.
///
/// Binary sources are generated rather than checked in: a small PNG at
/// `src/images/photo.png` and the favicon source at `src/favicon.png`.
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    write_bytes(tmp.path(), "src/images/photo.png", &sample_png(48, 32));
    write_bytes(tmp.path(), "src/favicon.png", &sample_png(64, 64));
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write a text file under `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    write_bytes(root, relative, contents.as_bytes());
}

pub fn write_bytes(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A gradient PNG with some detail, so optimizers have work to do.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 5) as u8, (y * 7) as u8, ((x + y) * 3) as u8])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

// =========================================================================
// Pipelines
// =========================================================================

/// A pipeline over the project at `root` with its `site.toml`, plus the
/// receiving end of its event channel.
///
/// Drop the pipeline before draining the receiver, or `iter()` blocks.
pub fn test_pipeline(root: &Path, target: TaskId) -> (Pipeline, mpsc::Receiver<PipelineEvent>) {
    let (tx, rx) = mpsc::channel();
    let config = load_config(root).unwrap();
    let pipeline = Pipeline::new(Layout::new(root), config, target).with_events(tx);
    (pipeline, rx)
}
