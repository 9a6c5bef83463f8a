//! Image normalization before upload
//!
//! Uploaded images are decoded, rotated upright according to their EXIF
//! orientation, scaled so the longest edge fits `max_size`, and re-encoded.
//! Re-encoding drops every embedded metadata block.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader};
use std::io::Cursor;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Raw image bytes and their declared media type
#[derive(Debug, Clone)]
pub struct AssetInput {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Scaling and quality bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    /// Longest edge of the output, in pixels.
    pub max_size: u32,
    /// Lossy quality, 0.0 to 1.0.
    pub quality: f32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_size: 1000,
            quality: 0.9,
        }
    }
}

/// Output format of the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
}

impl OutputFormat {
    /// Format for a declared media type; anything unsupported becomes JPEG.
    pub fn for_media_type(media_type: &str) -> Self {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => OutputFormat::Png,
            "image/webp" => OutputFormat::WebP,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
        }
    }
}

/// A re-encoded image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub media_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Guess a media type from a file extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Output dimensions for a `width` x `height` source bounded by `max_size`.
/// Never upscales; each edge is at least one pixel.
pub fn target_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let longest = width.max(height).max(1);
    let scale = (max_size as f64 / longest as f64).min(1.0);
    let scaled = |edge: u32| ((edge as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

fn encode_error(err: impl std::fmt::Display) -> SyncError {
    SyncError::Encode(err.to_string())
}

/// Decode, orient, scale and re-encode an image.
pub fn encode_image(input: &AssetInput, options: &EncodeOptions) -> Result<EncodedImage> {
    let reader = ImageReader::new(Cursor::new(&input.bytes))
        .with_guessed_format()
        .map_err(encode_error)?;
    let mut decoder = reader.into_decoder().map_err(encode_error)?;
    let orientation = decoder.orientation().map_err(encode_error)?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(encode_error)?;
    image.apply_orientation(orientation);

    let (width, height) = target_dimensions(image.width(), image.height(), options.max_size);
    if (width, height) != (image.width(), image.height()) {
        image = image.resize_exact(width, height, FilterType::CatmullRom);
    }

    let format = OutputFormat::for_media_type(&input.media_type);
    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new(&mut buf)
                .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
                .map_err(encode_error)?;
        }
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let quality = (options.quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buf, quality)
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(encode_error)?;
        }
        OutputFormat::WebP => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut buf)
                .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
                .map_err(encode_error)?;
        }
    }

    Ok(EncodedImage {
        base64: BASE64.encode(&buf),
        media_type: format.media_type(),
        extension: format.extension(),
        width,
        height,
    })
}
