//! Image encoding and output filename rendering.
//!
//! Centralizes output-format selection, compression tuning, and filename
//! templating so the batch pipeline and the CLI share one implementation.

use anyhow::{Context, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};
use log::warn;
use std::{
    fs,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Canonical image formats supported by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormatHint {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormatHint {
    /// Determine format from a filesystem extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    /// The canonical extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

impl Default for ImageFormatHint {
    fn default() -> Self {
        Self::Png
    }
}

impl std::str::FromStr for ImageFormatHint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Simplified PNG compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

impl PngCompression {
    /// Parse a compression string or numeric level into a strategy.
    pub fn parse(input: &str) -> Self {
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "fast" => Self::Fast,
            "best" => Self::Best,
            "default" => Self::Default,
            _ => {
                if let Ok(level) = normalized.parse::<u8>() {
                    match level {
                        0..=3 => Self::Fast,
                        7..=9 => Self::Best,
                        _ => Self::Default,
                    }
                } else {
                    warn!(
                        "Unknown PNG compression '{}', falling back to default strategy",
                        input
                    );
                    Self::Default
                }
            }
        }
    }

    fn into_image(self) -> CompressionType {
        match self {
            Self::Fast => CompressionType::Fast,
            Self::Default => CompressionType::Default,
            Self::Best => CompressionType::Best,
        }
    }
}

/// Encoding configuration derived from the persisted crop settings.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub format: ImageFormatHint,
    pub jpeg_quality: u8,
    pub png_compression: PngCompression,
    pub webp_quality: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            format: ImageFormatHint::Png,
            jpeg_quality: 90,
            png_compression: PngCompression::Default,
            webp_quality: 90,
        }
    }
}

impl EncodeSettings {
    /// The quality value recorded on results for the configured format.
    pub fn quality_for_format(&self) -> u8 {
        match self.format {
            ImageFormatHint::Jpeg => self.jpeg_quality.clamp(1, 100),
            ImageFormatHint::Webp => self.webp_quality.min(100),
            ImageFormatHint::Png => 100,
        }
    }
}

/// Encode an image to an in-memory payload using the configured format.
pub fn encode_image(image: &DynamicImage, settings: &EncodeSettings) -> Result<Vec<u8>> {
    match settings.format {
        ImageFormatHint::Png => encode_png(image, settings.png_compression),
        ImageFormatHint::Jpeg => encode_jpeg(image, settings.jpeg_quality.clamp(1, 100)),
        ImageFormatHint::Webp => encode_webp(image),
    }
}

fn encode_png(image: &DynamicImage, compression: PngCompression) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    {
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            compression.into_image(),
            FilterType::Adaptive,
        );
        encoder
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .context("failed to encode PNG")?;
    }
    Ok(buffer)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    {
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .context("failed to encode JPEG")?;
    }
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    {
        let encoder = WebPEncoder::new_lossless(&mut buffer);
        encoder
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )
            .context("failed to encode WebP")?;
    }
    Ok(buffer)
}

/// Render an output filename from a template.
///
/// Supported placeholders: `{original}`, `{index}`, `{width}`, `{height}`,
/// `{timestamp}`, `{ext}`. When the template does not mention `{ext}` the
/// extension is appended.
pub fn render_filename(
    template: &str,
    original: &str,
    index: usize,
    width: u32,
    height: u32,
    timestamp: u64,
    ext: &str,
) -> String {
    let mut name = template
        .replace("{original}", original)
        .replace("{index}", &index.to_string())
        .replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
        .replace("{timestamp}", &timestamp.to_string());
    if template.contains("{ext}") {
        name = name.replace("{ext}", ext);
    } else {
        name = format!("{name}.{ext}");
    }
    name
}

/// Write an encoded payload to disk, creating parent directories as needed.
pub fn write_payload(destination: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.exists()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(payload)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    writer.flush().ok();
    Ok(())
}
