//! Segmentation model sources and metadata

use crate::error::{BgRemovalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default square input resolution for BiRefNet-style models
pub const DEFAULT_INPUT_SIZE: u32 = 1024;

/// ImageNet channel means used by BiRefNet preprocessing
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations used by BiRefNet preprocessing
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Input geometry and normalization expected by the model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PreprocessingConfig {
    /// Model input `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self::with_input_size(DEFAULT_INPUT_SIZE)
    }
}

impl PreprocessingConfig {
    /// Square input of `size` pixels with ImageNet normalization
    #[must_use]
    pub fn with_input_size(size: u32) -> Self {
        Self {
            target_size: [size, size],
            normalization_mean: IMAGENET_MEAN,
            normalization_std: IMAGENET_STD,
        }
    }

    /// NCHW input shape for a single RGB image
    #[must_use]
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.target_size;
        (1, 3, height as usize, width as usize)
    }

    /// NCHW output shape of a single-channel mask
    #[must_use]
    pub fn output_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.target_size;
        (1, 1, height as usize, width as usize)
    }
}

/// Model provider trait for loading models
pub trait ModelProvider: std::fmt::Debug + Send + Sync {
    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    fn load_model_data(&self) -> Result<Vec<u8>>;

    /// Get model information
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - Invalid target size
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    fn get_model_path(&self) -> Result<PathBuf>;
}

/// A single `.onnx` file on disk
#[derive(Debug)]
pub struct FileModelProvider {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
}

impl FileModelProvider {
    /// Create a provider for the model file at `model_path`
    ///
    /// # Errors
    /// - `Model` if the path does not point to a regular file
    pub fn new<P: AsRef<Path>>(model_path: P, preprocessing: PreprocessingConfig) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();
        if !model_path.is_file() {
            return Err(BgRemovalError::model(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }
        Ok(Self {
            model_path,
            preprocessing,
        })
    }

    fn model_name(&self) -> String {
        self.model_path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned())
    }
}

impl ModelProvider for FileModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model file", &self.model_path, &e))
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("inspect model file", &self.model_path, &e))?;
        let size_bytes = usize::try_from(metadata.len()).unwrap_or(usize::MAX);

        Ok(ModelInfo {
            name: self.model_name(),
            precision: detect_precision(&self.model_path),
            size_bytes,
            input_shape: self.preprocessing.input_shape(),
            output_shape: self.preprocessing.output_shape(),
        })
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let [width, height] = self.preprocessing.target_size;
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_config(
                "Model input size must be greater than zero",
            ));
        }
        Ok(self.preprocessing.clone())
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_path.clone())
    }
}

/// Precision hint from common file naming, e.g. `birefnet_fp16.onnx`
fn detect_precision(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.contains("fp16") || name.contains("half") {
        "fp16".to_string()
    } else if name.contains("int8") || name.contains("quant") {
        "int8".to_string()
    } else {
        "fp32".to_string()
    }
}

/// Model manager for handling different model sources
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
}

impl ModelManager {
    /// Create model manager for an ONNX model file
    ///
    /// # Errors
    /// - `Model` if the file does not exist
    pub fn from_file<P: AsRef<Path>>(model_path: P, preprocessing: PreprocessingConfig) -> Result<Self> {
        let provider = FileModelProvider::new(model_path, preprocessing)?;
        Ok(Self::with_provider(Box::new(provider)))
    }

    #[must_use]
    pub fn with_provider(provider: Box<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Load model data
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        self.provider.get_model_info()
    }

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - Invalid target size
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.provider.get_preprocessing_config()
    }

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    pub fn get_model_path(&self) -> Result<PathBuf> {
        self.provider.get_model_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_preprocessing_config() {
        let config = PreprocessingConfig::default();
        assert_eq!(config.target_size, [1024, 1024]);
        assert_eq!(config.normalization_mean, IMAGENET_MEAN);
        assert_eq!(config.input_shape(), (1, 3, 1024, 1024));
        assert_eq!(config.output_shape(), (1, 1, 1024, 1024));
    }

    #[test]
    fn test_file_provider_reads_model() {
        let mut file = tempfile::Builder::new()
            .suffix("_fp16.onnx")
            .tempfile()
            .unwrap();
        file.write_all(b"fake-onnx-bytes").unwrap();

        let manager =
            ModelManager::from_file(file.path(), PreprocessingConfig::with_input_size(512)).unwrap();
        assert_eq!(manager.load_model().unwrap(), b"fake-onnx-bytes");

        let info = manager.get_info().unwrap();
        assert_eq!(info.size_bytes, 15);
        assert_eq!(info.precision, "fp16");
        assert_eq!(info.input_shape, (1, 3, 512, 512));
        assert_eq!(manager.get_model_path().unwrap(), file.path());
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelManager::from_file(dir.path().join("absent.onnx"), PreprocessingConfig::default())
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
    }

    #[test]
    fn test_zero_input_size_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let manager = ModelManager::from_file(file.path(), PreprocessingConfig::with_input_size(0)).unwrap();
        assert!(manager.get_preprocessing_config().is_err());
    }

    #[test]
    fn test_detect_precision() {
        assert_eq!(detect_precision(Path::new("BiRefNet-general-fp16.onnx")), "fp16");
        assert_eq!(detect_precision(Path::new("model_quantized.onnx")), "int8");
        assert_eq!(detect_precision(Path::new("model.onnx")), "fp32");
    }
}
