//! Image optimizer adapter, pure Rust via the `image` crate.
//!
//! | Input | Treatment |
//! |---|---|
//! | JPEG | decoded, re-encoded at the configured quality |
//! | PNG | decoded, re-encoded with best compression and adaptive filtering |
//! | anything else | passed through unchanged |
//!
//! The re-encoded bytes are kept only when they are smaller than the
//! original, so optimizing an already-optimized file never grows it.
//!
//! Files are processed in parallel using [rayon](https://docs.rs/rayon).

use super::{Adapter, AdapterError, Transformed};
use crate::fileset::{FileSet, SourceFile};
use crate::layout::has_extension;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use std::path::Path;

pub struct ImageOptimizer {
    quality: u8,
}

impl ImageOptimizer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn optimize(&self, file: &SourceFile) -> Result<Vec<u8>, AdapterError> {
        let Some(format) = optimizable_format(&file.path) else {
            return Ok(file.contents.clone());
        };
        let fail = |message: String| AdapterError::Failed {
            tool: "image",
            file: file.path.clone(),
            message,
        };
        let img = image::load_from_memory_with_format(&file.contents, format)
            .map_err(|e| fail(format!("decode: {e}")))?;

        let mut encoded = Vec::new();
        let result = match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut encoded, self.quality);
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
            }
            _ => {
                let encoder = PngEncoder::new_with_quality(
                    &mut encoded,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                img.write_with_encoder(encoder)
            }
        };
        result.map_err(|e| fail(format!("encode: {e}")))?;

        if encoded.len() < file.contents.len() {
            Ok(encoded)
        } else {
            Ok(file.contents.clone())
        }
    }
}

/// Formats this optimizer re-encodes. Everything else is copied.
fn optimizable_format(path: &Path) -> Option<ImageFormat> {
    if has_extension(path, "jpg") || has_extension(path, "jpeg") {
        Some(ImageFormat::Jpeg)
    } else if has_extension(path, "png") {
        Some(ImageFormat::Png)
    } else {
        None
    }
}

impl Adapter for ImageOptimizer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let files: Vec<SourceFile> = input.into_iter().collect();
        let optimized = files
            .par_iter()
            .map(|file| {
                self.optimize(file)
                    .map(|contents| SourceFile::new(file.path.clone(), contents))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FileSet::from(optimized).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    /// Encode a small gradient in the given format.
    fn sample_image(format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn output_never_larger_than_input() {
        let optimizer = ImageOptimizer::new(60);
        let jpeg = sample_image(ImageFormat::Jpeg);
        let png = sample_image(ImageFormat::Png);
        let input = FileSet::from(vec![
            SourceFile::new("a.jpg", jpeg.clone()),
            SourceFile::new("b.png", png.clone()),
        ]);

        let out = optimizer.apply(input).unwrap();
        assert!(out.files.get("a.jpg").unwrap().contents.len() <= jpeg.len());
        assert!(out.files.get("b.png").unwrap().contents.len() <= png.len());
    }

    #[test]
    fn optimized_images_still_decode() {
        let optimizer = ImageOptimizer::new(50);
        let input = FileSet::from(vec![SourceFile::new(
            "photo.JPG",
            sample_image(ImageFormat::Jpeg),
        )]);
        let out = optimizer.apply(input).unwrap();
        let img = image::load_from_memory(&out.files.get("photo.JPG").unwrap().contents).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn other_files_pass_through() {
        let optimizer = ImageOptimizer::new(80);
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec();
        let input = FileSet::from(vec![SourceFile::new("icons/logo.svg", svg.clone())]);
        let out = optimizer.apply(input).unwrap();
        assert_eq!(out.files.get("icons/logo.svg").unwrap().contents, svg);
    }

    #[test]
    fn corrupt_image_fails_with_path() {
        let optimizer = ImageOptimizer::new(80);
        let input = FileSet::from(vec![SourceFile::new("bad.png", b"not a png".to_vec())]);
        let err = optimizer.apply(input).unwrap_err();
        assert!(err.to_string().contains("bad.png"));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(ImageOptimizer::new(0).quality(), 1);
        assert_eq!(ImageOptimizer::new(200).quality(), 100);
    }
}
