//! Screenshot decoding and validation ahead of any provider call.
//!
//! DESIGN
//! ======
//! Payloads arrive as raw base64 or as a `data:` URL. The decoded bytes are
//! hashed (SHA-256, hex) for deduplication, the format is sniffed from magic
//! bytes, and dimensions are read straight from the container header. Only
//! PNG, JPEG, GIF and WEBP are accepted.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

pub const MIN_DIMENSION: u32 = 100;
pub const MAX_DIMENSION: u32 = 4096;
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

const MIN_ASPECT_RATIO: f64 = 0.3;
const MAX_ASPECT_RATIO: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(String),
    #[error("Image too large: {:.1}MB (max 10MB)", megabytes(.bytes))]
    FileTooLarge { bytes: usize },
    #[error("Unsupported format. Supported: PNG, JPEG, GIF, WEBP")]
    UnsupportedFormat,
    #[error("Cannot read {0:?} image dimensions")]
    UnreadableDimensions(ImageFormat),
    #[error("Image too small: {width}x{height} (min 100x100)")]
    TooSmall { width: u32, height: u32 },
    #[error("Image too large: {width}x{height} (max 4096x4096)")]
    TooLarge { width: u32, height: u32 },
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

// =============================================================================
// DECODING
// =============================================================================

/// Drop a `data:<mime>;base64,` prefix if present.
#[must_use]
pub fn strip_data_url(input: &str) -> &str {
    input.split_once(',').map_or(input, |(_, rest)| rest)
}

/// Decode a base64 or data-URL payload. Embedded whitespace is ignored.
///
/// # Errors
///
/// Returns `InvalidBase64` when the payload does not decode.
pub fn decode_payload(input: &str) -> Result<Vec<u8>, ImageError> {
    let cleaned: String = strip_data_url(input)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(ImageError::InvalidBase64("empty payload".into()));
    }
    BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| ImageError::InvalidBase64(e.to_string()))
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// SHA-256 of the decoded image, lowercase hex.
#[must_use]
pub fn image_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    bytes_to_hex(&hasher.finalize())
}

// =============================================================================
// FORMAT + DIMENSIONS
// =============================================================================

#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([b[0], b[1]])))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_le_bytes([b[0], b[1]])))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    Some((be_u32(bytes, 16)?, be_u32(bytes, 20)?))
}

fn gif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    Some((le_u16(bytes, 6)?, le_u16(bytes, 8)?))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // Fill bytes between markers.
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // Standalone markers carry no length.
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let len = usize::try_from(be_u16(bytes, i + 2)?).ok()?;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let height = be_u16(bytes, i + 5)?;
            let width = be_u16(bytes, i + 7)?;
            return Some((width, height));
        }
        i += 2 + len;
    }
    None
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match bytes.get(12..16)? {
        b"VP8 " => {
            if bytes.get(23..26)? != [0x9D, 0x01, 0x2A] {
                return None;
            }
            Some((le_u16(bytes, 26)? & 0x3FFF, le_u16(bytes, 28)? & 0x3FFF))
        }
        b"VP8L" => {
            if *bytes.get(20)? != 0x2F {
                return None;
            }
            let b = bytes.get(21..25)?;
            let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        b"VP8X" => Some((le_u24(bytes, 24)? + 1, le_u24(bytes, 27)? + 1)),
        _ => None,
    }
}

/// Sniff the format and read width/height from the header.
///
/// # Errors
///
/// Returns `UnsupportedFormat` or `UnreadableDimensions`.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let format = sniff_format(bytes).ok_or(ImageError::UnsupportedFormat)?;
    let dims = match format {
        ImageFormat::Png => png_dimensions(bytes),
        ImageFormat::Jpeg => jpeg_dimensions(bytes),
        ImageFormat::Gif => gif_dimensions(bytes),
        ImageFormat::Webp => webp_dimensions(bytes),
    };
    let (width, height) = dims.ok_or(ImageError::UnreadableDimensions(format))?;
    Ok(ImageInfo { format, width, height, size_bytes: bytes.len() })
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Check size, format, and dimension limits. Odd aspect ratios only warn.
///
/// # Errors
///
/// Returns the first failed check as an [`ImageError`].
pub fn validate(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(ImageError::FileTooLarge { bytes: bytes.len() });
    }
    let info = inspect(bytes)?;
    let (width, height) = (info.width, info.height);
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(ImageError::TooSmall { width, height });
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImageError::TooLarge { width, height });
    }
    let aspect = f64::from(width) / f64::from(height);
    if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect) {
        tracing::warn!(width, height, aspect, "unusual screenshot aspect ratio");
    }
    Ok(info)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Minimal PNG: signature + IHDR with the given size.
    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13_u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        BASE64.encode(png(width, height))
    }

    /// PNG header zero-padded to `len` bytes, base64 encoded.
    pub(crate) fn padded_png_base64(width: u32, height: u32, len: usize) -> String {
        let mut bytes = png(width, height);
        bytes.resize(len, 0);
        BASE64.encode(bytes)
    }
}

#[cfg(test)]
#[path = "screenshot_test.rs"]
mod tests;
