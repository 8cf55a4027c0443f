#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgremove-server
//!
//! HTTP service for background removal with a `BiRefNet` segmentation model
//! and for drawing solid outlines along the alpha edge of RGBA images.
//!
//! ## Features
//!
//! - **Background removal**: `POST /remove-bg` runs the model on ONNX Runtime
//!   or Tract and returns the cut-out as PNG
//! - **Border drawing**: `POST /add-border` outlines the opaque region of an
//!   image in any color, no model required
//! - **Model management**: optional download with SHA-256 verification and a
//!   local cache
//! - **Hardware acceleration**: CUDA, `CoreML` and CPU execution providers
//!
//! ## Border drawing
//!
//! ```rust
//! use bgremove_server::{draw_border, BorderColor};
//! use image::{Rgba, RgbaImage};
//!
//! let mut image = RgbaImage::new(20, 20);
//! for y in 5..15 {
//!     for x in 5..15 {
//!         image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
//!     }
//! }
//!
//! let bordered = draw_border(&image, BorderColor::parse("#0000FF").unwrap(), 2);
//! assert_eq!(bordered.dimensions(), (20, 20));
//! assert_eq!(*bordered.get_pixel(4, 10), Rgba([0, 0, 255, 255]));
//! ```
//!
//! ## Feature flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): pure Rust backend
//! - `webp-support` (default): WebP decoding for uploads

pub mod backends;
pub mod border;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use border::{draw_border, BorderCompositor, BorderOptions, DEFAULT_BORDER_THICKNESS};
pub use config::{BackendType, ExecutionProvider, InferenceConfig, RemovalOptions, ServerConfig};
pub use download::{resolve_model_path, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, PreprocessingConfig};
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory, ModelHandle};
pub use server::{create_router, serve, AppState};
pub use services::ImageIOService;
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::BorderColor;
