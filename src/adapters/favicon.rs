//! Favicon generator adapter.
//!
//! Takes the first favicon source image in the input set and produces:
//!
//! ```text
//! favicon-16x16.png … favicon-512x512.png   # one per configured size
//! apple-touch-icon.png                      # 180x180, flattened onto `background`
//! favicon.ico                               # 48x48
//! manifest.json                             # web app manifest listing the PNGs
//! ```
//!
//! Non-square sources are scaled to fit and centered on a transparent square
//! canvas.

use super::{Adapter, AdapterError, Transformed};
use crate::config::FaviconConfig;
use crate::fileset::{FileSet, SourceFile};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::Serialize;
use std::io::Cursor;
use std::path::PathBuf;

const APPLE_TOUCH_SIZE: u32 = 180;
const ICO_SIZE: u32 = 48;

pub struct FaviconGenerator {
    options: FaviconConfig,
}

#[derive(Debug, Serialize)]
struct WebManifest<'a> {
    name: &'a str,
    short_name: &'a str,
    description: &'a str,
    background_color: &'a str,
    theme_color: &'a str,
    display: &'static str,
    icons: Vec<ManifestIcon>,
}

#[derive(Debug, Serialize)]
struct ManifestIcon {
    src: String,
    sizes: String,
    #[serde(rename = "type")]
    mime: &'static str,
}

impl FaviconGenerator {
    pub fn new(options: FaviconConfig) -> Self {
        Self { options }
    }

    fn icon_url(&self, name: &str) -> String {
        format!("{}/{}", self.options.path.trim_end_matches('/'), name)
    }

    fn manifest(&self) -> Result<Vec<u8>, serde_json::Error> {
        let icons = self
            .options
            .sizes
            .iter()
            .map(|size| ManifestIcon {
                src: self.icon_url(&png_name(*size)),
                sizes: format!("{size}x{size}"),
                mime: "image/png",
            })
            .collect();
        let manifest = WebManifest {
            name: &self.options.app_name,
            short_name: self
                .options
                .app_short_name
                .as_deref()
                .unwrap_or(&self.options.app_name),
            description: &self.options.app_description,
            background_color: &self.options.background,
            theme_color: &self.options.theme_color,
            display: "standalone",
            icons,
        };
        serde_json::to_vec_pretty(&manifest)
    }
}

impl Adapter for FaviconGenerator {
    fn name(&self) -> &'static str {
        "favicons"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let Some(source) = input.iter().next() else {
            return Ok(Transformed::default());
        };
        let fail = |message: String| AdapterError::Failed {
            tool: "favicons",
            file: source.path.clone(),
            message,
        };
        let img = image::load_from_memory(&source.contents)
            .map_err(|e| fail(format!("decode: {e}")))?;

        let mut out = FileSet::new();
        for size in &self.options.sizes {
            let icon = square_icon(&img, *size, None);
            out.push(SourceFile::new(
                png_name(*size),
                encode(&icon, ImageFormat::Png).map_err(&fail)?,
            ));
        }
        if self.options.apple_touch {
            let background = parse_hex_color(&self.options.background)
                .ok_or_else(|| fail(format!("invalid background color {:?}", self.options.background)))?;
            let icon = square_icon(&img, APPLE_TOUCH_SIZE, Some(background));
            out.push(SourceFile::new(
                "apple-touch-icon.png",
                encode(&icon, ImageFormat::Png).map_err(&fail)?,
            ));
        }
        if self.options.ico {
            let icon = square_icon(&img, ICO_SIZE, None);
            out.push(SourceFile::new(
                "favicon.ico",
                encode(&icon, ImageFormat::Ico).map_err(&fail)?,
            ));
        }
        if self.options.manifest {
            let json = self.manifest().map_err(|e| fail(e.to_string()))?;
            out.push(SourceFile::new(PathBuf::from("manifest.json"), json));
        }
        Ok(out.into())
    }
}

fn png_name(size: u32) -> String {
    format!("favicon-{size}x{size}.png")
}

/// Scale `img` to fit a `size`×`size` square and center it on a canvas that
/// is transparent, or filled with `background` when given.
fn square_icon(img: &DynamicImage, size: u32, background: Option<Rgba<u8>>) -> RgbaImage {
    let scaled = img.resize(size, size, FilterType::Lanczos3).to_rgba8();
    let fill = background.unwrap_or(Rgba([0, 0, 0, 0]));
    let mut canvas = RgbaImage::from_pixel(size, size, fill);
    let x = (size - scaled.width()) / 2;
    let y = (size - scaled.height()) / 2;
    imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}

fn encode(icon: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(icon.clone())
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| format!("encode {format:?}: {e}"))?;
    Ok(bytes)
}

/// Parse `#rgb` or `#rrggbb` into an opaque color.
fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.strip_prefix('#')?;
    let channel = |h: &str| u8::from_str_radix(h, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => Some(Rgba([
            channel(hex.get(0..2)?)?,
            channel(hex.get(2..4)?)?,
            channel(hex.get(4..6)?)?,
            255,
        ])),
        _ => None,
    }
}
