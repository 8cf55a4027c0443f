//! Result and intermediate types for background removal

use crate::error::{BgRemovalError, Result};
use crate::services::ImageIOService;
use image::{imageops::FilterType, GrayImage, RgbaImage};
use serde::Serialize;

/// Single-channel soft mask, 0 = background and 255 = foreground
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    pub data: Vec<u8>,
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - `Processing` if the data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone())
            .ok_or_else(|| BgRemovalError::processing("Failed to create image from mask data"))
    }

    /// Resize the mask with bilinear filtering
    ///
    /// # Errors
    /// - `Processing` if the mask data is inconsistent
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<SegmentationMask> {
        if self.dimensions == (new_width, new_height) {
            return Ok(self.clone());
        }
        let current_image = self.to_image()?;
        let resized =
            image::imageops::resize(&current_image, new_width, new_height, FilterType::Triangle);
        Ok(SegmentationMask::from_image(&resized))
    }

    /// Fraction of pixels above the midpoint
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v > 127).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// Per-stage timings for one removal request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingTimings {
    pub image_decode_ms: u64,
    /// Resize, normalize and tensor conversion
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    /// Sigmoid, mask resize and foreground refinement
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "decode {}ms, preprocess {}ms, inference {}ms, postprocess {}ms, total {}ms",
            self.image_decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.postprocessing_ms,
            self.total_ms
        )
    }
}

/// Output of background removal: the cut-out image and its mask
#[derive(Debug, Clone)]
pub struct RemovalResult {
    pub image: RgbaImage,
    pub mask: SegmentationMask,
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(image: RgbaImage, mask: SegmentationMask, timings: ProcessingTimings) -> Self {
        Self {
            image,
            mask,
            timings,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode the result image as PNG
    ///
    /// # Errors
    /// - `Image` if encoding fails
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }
}
