//! Image encoder: turns a locally held image into a base64 payload for the
//! inference request.
//!
//! Two modes:
//! - **Passthrough**: base64 of the bytes as held.
//! - **Recompress**: decode, fix EXIF orientation, downscale so the longest
//!   edge fits `max_dimension`, re-encode as JPEG. The request tags every
//!   image as `image/jpeg`, so this keeps the tag honest for PNG input.

use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DiagnosisError;
use crate::config::DiagnosisConfig;

/// Largest image accepted, before or after base64 decoding.
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024; // 20 MB

/// Handle to an image the user picked or captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// File on local storage (gallery pick, dialog selection).
    Path(PathBuf),
    /// Raw bytes already in memory.
    Bytes(Vec<u8>),
    /// Base64 text, optionally with a `data:<mime>;base64,` prefix
    /// (camera captures from the webview arrive this way).
    Encoded(String),
}

impl ImageRef {
    /// Short description for logs and previews. Never includes image data.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::Encoded(text) => format!("<{} base64 chars>", text.len()),
        }
    }
}

/// How the encoder treats image bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodeMode {
    Passthrough,
    Recompress {
        max_dimension: u32,
        /// JPEG quality factor in (0, 1].
        quality: f32,
    },
}

#[derive(Debug, Clone)]
pub struct ImageEncoder {
    mode: EncodeMode,
}

impl ImageEncoder {
    pub fn new(mode: EncodeMode) -> Self {
        Self { mode }
    }

    pub fn passthrough() -> Self {
        Self::new(EncodeMode::Passthrough)
    }

    /// Encoder configured from the image settings.
    pub fn from_config(config: &DiagnosisConfig) -> Self {
        if config.recompress_images {
            Self::new(EncodeMode::Recompress {
                max_dimension: config.max_image_size,
                quality: config.image_quality,
            })
        } else {
            Self::passthrough()
        }
    }

    pub fn mode(&self) -> EncodeMode {
        self.mode
    }

    /// Encode one image to base64 (no data-URI prefix).
    pub fn encode(&self, image: &ImageRef) -> Result<String, DiagnosisError> {
        match (self.mode, image) {
            // Already base64: strip the prefix, check it decodes within limits.
            (EncodeMode::Passthrough, ImageRef::Encoded(text)) => {
                let payload = strip_data_uri_prefix(text).trim();
                check_image_len(decode_base64(payload)?.len(), image)?;
                Ok(payload.to_string())
            }
            (EncodeMode::Passthrough, _) => {
                let bytes = read_image_bytes(image)?;
                Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
            }
            (EncodeMode::Recompress { max_dimension, quality }, _) => {
                let bytes = read_image_bytes(image)?;
                let jpeg = recompress_jpeg(&bytes, max_dimension, quality)?;
                Ok(base64::engine::general_purpose::STANDARD.encode(&jpeg))
            }
        }
    }

    /// Encode every image, in order. Stops at the first failure.
    pub fn encode_all(&self, images: &[ImageRef]) -> Result<Vec<String>, DiagnosisError> {
        let _span = tracing::debug_span!("encode_images", count = images.len()).entered();
        images
            .iter()
            .enumerate()
            .map(|(index, image)| {
                self.encode(image).inspect_err(|e| {
                    tracing::warn!(index, image = %image.describe(), error = %e, "Image encoding failed");
                })
            })
            .collect()
    }
}

/// Drop a leading `data:<mime>;base64,` header if present.
pub fn strip_data_uri_prefix(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload;
        }
    }
    text
}

/// Raw bytes behind an image handle, size-checked.
pub fn read_image_bytes(image: &ImageRef) -> Result<Vec<u8>, DiagnosisError> {
    let bytes = match image {
        ImageRef::Path(path) => std::fs::read(path).map_err(|e| {
            DiagnosisError::Encoding(format!("Cannot read {}: {e}", path.display()))
        })?,
        ImageRef::Bytes(bytes) => bytes.clone(),
        ImageRef::Encoded(text) => decode_base64(strip_data_uri_prefix(text).trim())?,
    };
    check_image_len(bytes.len(), image)?;
    Ok(bytes)
}

fn check_image_len(len: usize, image: &ImageRef) -> Result<(), DiagnosisError> {
    if len == 0 {
        return Err(DiagnosisError::Encoding(format!(
            "Image {} is empty",
            image.describe()
        )));
    }
    if len > MAX_IMAGE_BYTES {
        return Err(DiagnosisError::Encoding(format!(
            "Image {} exceeds {}MB limit",
            image.describe(),
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, DiagnosisError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| DiagnosisError::Encoding(format!("Invalid base64 image data: {e}")))
}

/// Decode, orient, downscale and re-encode as JPEG.
pub fn recompress_jpeg(
    bytes: &[u8],
    max_dimension: u32,
    quality: f32,
) -> Result<Vec<u8>, DiagnosisError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| DiagnosisError::Encoding(format!("Unsupported or corrupt image: {e}")))?;

    let oriented = apply_orientation(decoded, read_exif_orientation(bytes));
    let fitted = downscale_to_fit(oriented, max_dimension);

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(fitted.into_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(jpeg_quality(quality)))
        .map_err(|e| DiagnosisError::Encoding(format!("JPEG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Map a 0–1 quality factor onto the JPEG 1–100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as i32).clamp(1, 100) as u8
}

/// Shrink so the longest edge is at most `max_dimension`. Never upscales.
pub fn downscale_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w.max(h) <= max_dimension {
        return image;
    }

    let (new_w, new_h) = compute_fit_dimensions(w, h, max_dimension);
    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling image for upload"
    );
    image.resize_exact(new_w, new_h, FilterType::CatmullRom)
}

/// Dimensions that fit inside a `max`-sided square preserving aspect ratio.
/// Small images keep their size.
pub fn compute_fit_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }

    let scale = (max as f32 / width as f32)
        .min(max as f32 / height as f32)
        .min(1.0);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, max);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, max);
    (new_w, new_h)
}

/// Read EXIF tag 0x0112 (Orientation). Returns 1 (normal) if absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
