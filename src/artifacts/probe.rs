//! Decoding and probing of image artifacts returned by the service.
//!
//! Used when the user saves the preview or a profile plot: the bytes are
//! decoded (inline `data:` URLs) or downloaded (served paths), then checked
//! to actually be an image so the caller can pick a file extension.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;
use tracing::info;

use crate::error::{Result, SessionError};

/// Image bytes together with their probed format and size.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl FetchedImage {
    /// Probe raw bytes. Fails if they do not decode as a supported image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes)
            .map_err(|e| SessionError::InvalidImage(format!("Unrecognized image format: {}", e)))?;

        let img = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| SessionError::InvalidImage(format!("Failed to decode image: {}", e)))?;

        let (width, height) = (img.width(), img.height());
        info!("Probed image: {:?} {}x{} ({} bytes)", format, width, height, bytes.len());

        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    /// Preferred file extension for saving, e.g. `png`.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    pub fn media_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Decode a base64 `data:` URL into raw bytes.
pub fn decode_data_url(reference: &str) -> Result<Vec<u8>> {
    let rest = reference
        .strip_prefix("data:")
        .ok_or_else(|| SessionError::InvalidImage("Not a data URL".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| SessionError::InvalidImage("Data URL has no payload".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(SessionError::InvalidImage(format!(
            "Unsupported data URL encoding: {}",
            header
        )));
    }

    STANDARD
        .decode(payload.trim())
        .map_err(|e| SessionError::InvalidImage(format!("Invalid base64 image data: {}", e)))
}
