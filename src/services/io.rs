//! In-memory image decoding and encoding
//!
//! Uploaded images arrive as raw bytes and responses leave as PNG bytes;
//! nothing in the request path touches the filesystem.

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Service for decoding uploads and encoding responses
pub struct ImageIOService;

impl ImageIOService {
    /// Decode image bytes with content-based format detection
    ///
    /// # Errors
    /// - `InvalidImage` if the bytes are empty or not a supported image format
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::invalid_image("empty upload"));
        }

        image::load_from_memory(bytes).map_err(|e| BgRemovalError::invalid_image(e.to_string()))
    }

    /// Decode image bytes and convert to RGBA
    ///
    /// # Errors
    /// - `InvalidImage` if the bytes cannot be decoded
    pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
        Ok(Self::decode(bytes)?.to_rgba8())
    }

    /// Encode an RGBA image as PNG
    ///
    /// # Errors
    /// - `Image` if the encoder fails
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::with_capacity(image.as_raw().len() / 2));
        image.write_to(&mut buffer, ImageFormat::Png)?;
        log::debug!(
            "Encoded {}x{} PNG ({} bytes)",
            image.width(),
            image.height(),
            buffer.get_ref().len()
        );
        Ok(buffer.into_inner())
    }
}
