use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use imagine_contracts::models::OutputFormat;
use imagine_contracts::{GenerationError, Result};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub mime_type: &'static str,
}

impl EncodedImage {
    fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        Self {
            bytes,
            format,
            mime_type: format.mime_type(),
        }
    }
}

/// Re-encodes decoded image bytes for download.
///
/// JPEG drops alpha and uses quality 95; WEBP is lossless. When the target
/// encoder fails the image is delivered as PNG instead, so `format` on the
/// result may differ from the one asked for.
pub fn encode(bytes: &[u8], target: OutputFormat) -> Result<EncodedImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| GenerationError::Encoding(format!("image could not be decoded: {err}")))?;

    let attempt = match target {
        OutputFormat::Png => write_png(&decoded),
        OutputFormat::Jpeg => write_jpeg(&decoded),
        OutputFormat::Webp => write_webp(&decoded),
    };
    match attempt {
        Ok(encoded) => Ok(EncodedImage::new(encoded, target)),
        Err(err) if target != OutputFormat::Png => {
            log::warn!(
                "{} encoding failed ({err}); delivering PNG instead",
                target.wire_value()
            );
            let encoded = write_png(&decoded).map_err(|err| {
                GenerationError::Encoding(format!("PNG fallback failed: {err}"))
            })?;
            Ok(EncodedImage::new(encoded, OutputFormat::Png))
        }
        Err(err) => Err(GenerationError::Encoding(format!("PNG encoding failed: {err}"))),
    }
}

/// `image_{n}.{ext}`, `n` being the 1-based history number.
pub fn download_file_name(number: usize, format: OutputFormat) -> String {
    format!("image_{number}.{}", format.extension())
}

fn write_png(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match image.write_to(&mut out, ImageFormat::Png) {
        Ok(()) => Ok(out.into_inner()),
        Err(_) => {
            // Unusual sample types (e.g. 32-bit float) have no PNG layout.
            let mut out = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut out, ImageFormat::Png)?;
            Ok(out.into_inner())
        }
    }
}

fn write_jpeg(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}

fn write_webp(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut out = Vec::new();
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))?;
    Ok(out)
}
