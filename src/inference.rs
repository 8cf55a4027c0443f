//! Inference backend abstraction

use crate::{
    config::InferenceConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for segmentation inference backends
///
/// Backends take a normalized NCHW RGB tensor and return the model's raw
/// single-channel output `[1, 1, H, W]`. Activation and resizing are applied
/// by the caller.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time when the backend measured it.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &InferenceConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Unexpected output tensor shape
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Invalid or missing preprocessing configuration
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockSegmentationBackend;

    #[test]
    fn test_backend_trait_object() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockSegmentationBackend::new(32));
        assert!(!backend.is_initialized());
        backend.initialize(&InferenceConfig::default()).unwrap();
        assert!(backend.is_initialized());
        assert_eq!(backend.name(), "mock");

        let config = backend.get_preprocessing_config().unwrap();
        assert_eq!(config.target_size, [32, 32]);

        let info = backend.get_model_info().unwrap();
        assert_eq!(info.input_shape, (1, 3, 32, 32));
        assert_eq!(info.output_shape, (1, 1, 32, 32));
    }
}
