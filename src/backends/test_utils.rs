//! Mock backends for testing inference without model files
//!
//! The mock emits logits: a large positive value inside a centered square
//! covering the middle half of the input, a large negative value elsewhere.
//! After a sigmoid this is a near-binary foreground mask, which makes the
//! expected alpha of any pixel easy to predict in tests.

use crate::{
    config::InferenceConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

const FOREGROUND_LOGIT: f32 = 10.0;
const BACKGROUND_LOGIT: f32 = -10.0;

/// Mock segmentation backend with a fixed square foreground
#[derive(Debug, Clone)]
pub struct MockSegmentationBackend {
    initialized: bool,
    preprocessing_config: PreprocessingConfig,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockSegmentationBackend {
    /// Mock model with a square input of `size` pixels
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            initialized: false,
            preprocessing_config: PreprocessingConfig::with_input_size(size),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::new(16)
        }
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new(16)
        }
    }

    /// Shared handle to the recorded calls, valid after the backend is boxed
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// Whether output coordinate `(x, y)` of a `width x height` mask is foreground
    #[must_use]
    pub fn is_foreground(x: usize, y: usize, width: usize, height: usize) -> bool {
        (width / 4..width - width / 4).contains(&x) && (height / 4..height - height / 4).contains(&y)
    }
}

impl Default for MockSegmentationBackend {
    fn default() -> Self {
        Self::new(64)
    }
}

impl InferenceBackend for MockSegmentationBackend {
    fn initialize(&mut self, _config: &InferenceConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failed"));
        }

        let shape = input.shape();
        let (batch, height, width) = (
            shape.first().copied().unwrap_or(1),
            shape.get(2).copied().unwrap_or(0),
            shape.get(3).copied().unwrap_or(0),
        );

        Ok(Array4::from_shape_fn((batch, 1, height, width), |(_, _, y, x)| {
            if Self::is_foreground(x, y, width, height) {
                FOREGROUND_LOGIT
            } else {
                BACKGROUND_LOGIT
            }
        }))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config.clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-segmentation".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 1024,
            input_shape: self.preprocessing_config.input_shape(),
            output_shape: self.preprocessing_config.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut backend = MockSegmentationBackend::new(8);
        let history = backend.call_history();
        backend.initialize(&InferenceConfig::default()).unwrap();
        backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(*history.lock().unwrap(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_mock_output_square() {
        let mut backend = MockSegmentationBackend::new(8);
        backend.initialize(&InferenceConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(output.shape(), &[1, 1, 8, 8]);
        assert_eq!(output[[0, 0, 4, 4]], FOREGROUND_LOGIT);
        assert_eq!(output[[0, 0, 0, 0]], BACKGROUND_LOGIT);
        assert_eq!(output[[0, 0, 2, 2]], FOREGROUND_LOGIT);
        assert_eq!(output[[0, 0, 6, 6]], BACKGROUND_LOGIT);
    }

    #[test]
    fn test_mock_failures() {
        let mut failing_init = MockSegmentationBackend::new_failing_init();
        assert!(failing_init.initialize(&InferenceConfig::default()).is_err());

        let mut uninitialized = MockSegmentationBackend::new(8);
        assert!(uninitialized.infer(&Array4::zeros((1, 3, 8, 8))).is_err());

        let mut failing = MockSegmentationBackend::new_failing_inference();
        failing.initialize(&InferenceConfig::default()).unwrap();
        assert!(failing.infer(&Array4::zeros((1, 3, 16, 16))).is_err());
    }
}
