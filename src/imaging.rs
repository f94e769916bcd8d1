//! Server-side image normalization.
//!
//! Uploaded pages are decoded, downscaled so neither side exceeds a maximum
//! dimension, and re-encoded until they fit a byte budget. Encoding is
//! CPU-bound and runs on the blocking pool.

use crate::upload::{PreparedImage, UploadedFile};
use bytes::Bytes;
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;
use thiserror::Error;

/// JPEG qualities tried in order until the output fits the byte budget.
const JPEG_QUALITIES: [u8; 6] = [90, 80, 70, 60, 50, 40];
/// Each shrink step scales the longest side by this factor.
const SHRINK_FACTOR: f32 = 0.8;
/// Images are never shrunk below this longest side to meet the byte budget.
const MIN_DIMENSION: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub format: OutputFormat,
    /// Pass the original bytes through when normalization fails.
    pub fallback: bool,
}

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("không xử lý được ảnh: {0}")]
    Image(#[from] image::ImageError),

    #[error("không đọc được ảnh: {0}")]
    Io(#[from] std::io::Error),

    #[error("normalization task failed: {0}")]
    Task(String),
}

fn encode(img: &DynamicImage, format: OutputFormat, max_bytes: usize) -> Result<Vec<u8>, ImagingError> {
    match format {
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let mut buf = Vec::new();
            WebPEncoder::new_lossless(&mut buf).write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )?;
            Ok(buf)
        }
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut last = Vec::new();
            for quality in JPEG_QUALITIES {
                let mut buf = Vec::new();
                JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
                if buf.len() <= max_bytes {
                    return Ok(buf);
                }
                last = buf;
            }
            Ok(last)
        }
    }
}

/// Decodes `data`, bounds its dimensions and re-encodes it to `options.format`,
/// shrinking further until the output fits `options.max_bytes` or the image
/// reaches the minimum size.
pub fn normalize(data: &[u8], options: &NormalizeOptions) -> Result<PreparedImage, ImagingError> {
    let decoded = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;

    let max = options.max_dimension.max(1);
    let mut img = if decoded.width() > max || decoded.height() > max {
        decoded.resize(max, max, FilterType::Lanczos3)
    } else {
        decoded
    };

    loop {
        let encoded = encode(&img, options.format, options.max_bytes)?;
        let longest = img.width().max(img.height());
        if encoded.len() <= options.max_bytes || longest <= MIN_DIMENSION {
            return Ok(PreparedImage {
                data: Bytes::from(encoded),
                extension: options.format.extension().to_string(),
                content_type: options.format.content_type().to_string(),
            });
        }

        let target = ((longest as f32 * SHRINK_FACTOR) as u32).max(MIN_DIMENSION);
        img = img.resize(target, target, FilterType::Triangle);
    }
}

/// Turns an upload into the bytes that get stored. With `options` unset the
/// upload is stored as received.
pub async fn prepare(
    file: &UploadedFile,
    options: Option<&NormalizeOptions>,
) -> Result<PreparedImage, ImagingError> {
    let original = PreparedImage::from(file);
    let Some(options) = options else {
        return Ok(original);
    };

    let data = file.data.clone();
    let task_options = options.clone();
    let result = tokio::task::spawn_blocking(move || normalize(&data, &task_options))
        .await
        .map_err(|e| ImagingError::Task(e.to_string()))
        .and_then(|r| r);

    match result {
        Ok(normalized) => {
            tracing::info!(
                "Normalized {}: {:.2} KB -> {:.2} KB ({})",
                file.filename,
                file.data.len() as f64 / 1024.0,
                normalized.data.len() as f64 / 1024.0,
                normalized.extension
            );
            Ok(normalized)
        }
        Err(e) if options.fallback => {
            tracing::warn!("Normalization of {} failed, storing original: {}", file.filename, e);
            Ok(original)
        }
        Err(e) => Err(e),
    }
}
