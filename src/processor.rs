//! Background removal pipeline
//!
//! [`ModelHandle`] owns the initialized inference backend and turns RGB images
//! into soft masks at the model's resolution. [`BackgroundRemovalProcessor`]
//! wraps a shared handle with the post-processing that produces the final
//! cut-out: mask resize, foreground color refinement and alpha attachment.

use crate::{
    config::{BackendType, InferenceConfig, RemovalOptions},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    services::ImageIOService,
    tracing_config::spans,
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{estimate_foreground, ImagePreprocessor},
};
use image::{DynamicImage, RgbImage, RgbaImage};
use instant::Instant;
use log::{debug, info};
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - `InvalidConfig` if the backend was not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled by cargo features
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BgRemovalError::invalid_config(format!(
                    "{other} backend is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        #[cfg_attr(not(any(feature = "onnx", feature = "tract")), allow(unused_mut))]
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Initialized segmentation model shared across requests
///
/// Backends need `&mut self` for inference, so calls are serialized through a
/// mutex. Lock only from blocking threads.
pub struct ModelHandle {
    backend: Mutex<Box<dyn InferenceBackend>>,
    backend_name: &'static str,
    preprocessing: PreprocessingConfig,
    info: ModelInfo,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.backend_name)
            .field("model", &self.info.name)
            .field("target_size", &self.preprocessing.target_size)
            .finish()
    }
}

impl ModelHandle {
    /// Initialize `backend` and wrap it for shared use
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Missing model metadata
    pub fn load(mut backend: Box<dyn InferenceBackend>, config: &InferenceConfig) -> Result<Self> {
        let backend_name = backend.name();
        let info = backend.get_model_info()?;
        let _span = spans::model_loading(&info.name, backend_name).entered();

        if let Some(load_time) = backend.initialize(config)? {
            info!(
                "Loaded model {} on {} backend in {}ms",
                info.name,
                backend_name,
                load_time.as_millis()
            );
        }

        let preprocessing = backend.get_preprocessing_config()?;
        Ok(Self {
            backend: Mutex::new(backend),
            backend_name,
            preprocessing,
            info,
        })
    }

    /// Create the backend through `factory` and initialize it
    ///
    /// # Errors
    /// - Backend not enabled in this build
    /// - Model loading failures
    pub fn from_factory(
        factory: &dyn BackendFactory,
        backend_type: BackendType,
        model_manager: ModelManager,
        config: &InferenceConfig,
    ) -> Result<Self> {
        let backend = factory.create_backend(backend_type, model_manager)?;
        Self::load(backend, config)
    }

    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    #[must_use]
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Soft mask for `image` at the model's output resolution
    ///
    /// # Errors
    /// - Preprocessing or inference failures
    /// - Unexpected output tensor shape
    pub fn segment(&self, image: &RgbImage, apply_sigmoid: bool) -> Result<SegmentationMask> {
        let (mask, _) = self.segment_timed(image, apply_sigmoid)?;
        Ok(mask)
    }

    fn segment_timed(
        &self,
        image: &RgbImage,
        apply_sigmoid: bool,
    ) -> Result<(SegmentationMask, (u64, u64))> {
        let _span = spans::inference(&self.info.name, image.dimensions()).entered();

        let preprocess_start = Instant::now();
        let tensor = ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?;
        let preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| BgRemovalError::internal("Model lock poisoned"))?;
            backend.infer(&tensor)?
        };
        let inference_ms = inference_start.elapsed().as_millis() as u64;

        let mask = tensor_to_mask(&output, apply_sigmoid)?;
        Ok((mask, (preprocessing_ms, inference_ms)))
    }
}

/// Convert a `[1, 1, H, W]` output tensor into an 8-bit mask
///
/// Values are mapped through a sigmoid when requested, clamped to `[0, 1]`
/// and scaled to `0..=255` with truncation.
///
/// # Errors
/// - `Inference` if the tensor is not a single-channel single-image output
pub fn tensor_to_mask(tensor: &Array4<f32>, apply_sigmoid: bool) -> Result<SegmentationMask> {
    let (batch, channels, height, width) = tensor.dim();
    if batch != 1 || channels != 1 {
        return Err(BgRemovalError::inference(format!(
            "Expected output shape [1, 1, H, W], got {:?}",
            tensor.shape()
        )));
    }

    let data = tensor
        .iter()
        .map(|&value| {
            let probability = if apply_sigmoid { sigmoid(value) } else { value };
            (probability.clamp(0.0, 1.0) * 255.0) as u8
        })
        .collect();

    Ok(SegmentationMask::new(data, (width as u32, height as u32)))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Background removal on top of a shared [`ModelHandle`]
#[derive(Debug, Clone)]
pub struct BackgroundRemovalProcessor {
    model: Arc<ModelHandle>,
    options: RemovalOptions,
}

impl BackgroundRemovalProcessor {
    #[must_use]
    pub fn new(model: Arc<ModelHandle>, options: RemovalOptions) -> Self {
        Self { model, options }
    }

    #[must_use]
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    #[must_use]
    pub fn options(&self) -> RemovalOptions {
        self.options
    }

    /// Decode `bytes` and remove the background
    ///
    /// # Errors
    /// - `InvalidImage` if the bytes cannot be decoded
    /// - Inference and processing failures
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<RemovalResult> {
        let decode_start = Instant::now();
        let image = ImageIOService::decode(bytes)?;
        let image_decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image)?;
        result.timings.image_decode_ms = image_decode_ms;
        result.timings.total_ms += image_decode_ms;
        Ok(result)
    }

    /// Remove the background from a decoded image
    ///
    /// Any existing alpha is discarded; the returned image carries the
    /// predicted mask as its alpha channel.
    ///
    /// # Errors
    /// - Inference and processing failures
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn process_image(&self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_image("image has zero width or height"));
        }

        let (model_mask, (preprocessing_ms, inference_ms)) =
            self.model.segment_timed(&rgb, self.options.apply_sigmoid)?;

        let postprocess_start = Instant::now();
        let mask = model_mask.resize(width, height)?;
        let alpha = mask.to_image()?;

        let foreground = if self.options.refine_foreground {
            estimate_foreground(&rgb, &alpha)?
        } else {
            rgb
        };

        let output = RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b] = foreground.get_pixel(x, y).0;
            image::Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
        });
        let postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        let timings = ProcessingTimings {
            image_decode_ms: 0,
            preprocessing_ms,
            inference_ms,
            postprocessing_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };
        debug!(
            "Removed background from {width}x{height} image ({:.1}% foreground): {}",
            mask.foreground_ratio() * 100.0,
            timings.summary()
        );

        Ok(RemovalResult::new(output, mask, timings))
    }
}
