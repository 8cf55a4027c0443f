//! Image preprocessing for segmentation inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Converts source images into normalized model input tensors
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an RGB image for model inference
    ///
    /// The image is stretched to the configured target size without
    /// preserving the aspect ratio, then normalized to an NCHW tensor using
    /// the configured per-channel mean and standard deviation.
    ///
    /// # Errors
    /// - `Processing` if the image or the target size is empty
    pub fn preprocess_for_inference(
        image: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::processing(format!(
                "Invalid model input size {target_width}x{target_height}"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing("Cannot preprocess an empty image"));
        }

        let resized = if image.dimensions() == (target_width, target_height) {
            image.clone()
        } else {
            image::imageops::resize(image, target_width, target_height, FilterType::Triangle)
        };

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] =
                        (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config(size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [size, size],
            ..PreprocessingConfig::default()
        }
    }

    #[test]
    fn test_preprocess_stretches_to_target() {
        let image = RgbImage::from_pixel(100, 40, Rgb([255, 0, 0]));
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config(64)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    }

    #[test]
    fn test_normalization_values() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 128]));
        let cfg = config(8);
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &cfg).unwrap();

        let expected_r = (1.0 - cfg.normalization_mean[0]) / cfg.normalization_std[0];
        let expected_g = (0.0 - cfg.normalization_mean[1]) / cfg.normalization_std[1];
        assert!((tensor[[0, 0, 3, 3]] - expected_r).abs() < 1e-5);
        assert!((tensor[[0, 1, 3, 3]] - expected_g).abs() < 1e-5);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let empty = RgbImage::new(0, 0);
        assert!(ImagePreprocessor::preprocess_for_inference(&empty, &config(8)).is_err());

        let image = RgbImage::new(4, 4);
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &config(0)).is_err());
    }
}
