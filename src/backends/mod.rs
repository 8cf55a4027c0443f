//! Inference backends
//!
//! - ONNX Runtime backend (GPU acceleration via CUDA or `CoreML`)
//! - Tract backend (pure Rust, no native dependencies)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
