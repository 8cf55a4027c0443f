//! Error types for background removal and border operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types surfaced by the processing pipeline and the HTTP boundary
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// The request carried no `image` field
    #[error("No image uploaded")]
    MissingInput,

    /// The uploaded bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A border color string could not be parsed into an RGB triple
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// A request parameter other than the color was malformed
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The request body exceeded the configured limit
    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download failures
    #[error("Network error: {0}")]
    Network(String),

    /// Memory allocation or processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(detail: S) -> Self {
        Self::InvalidImage(detail.into())
    }

    /// Create a new invalid color error
    pub fn invalid_color<S: Into<String>>(detail: S) -> Self {
        Self::InvalidColor(detail.into())
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(detail: S) -> Self {
        Self::InvalidParameter(detail.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create network error with request context
    pub fn network_error<E: std::fmt::Display>(context: impl Into<String>, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Whether the error was caused by the caller's input rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingInput
                | Self::InvalidImage(_)
                | Self::InvalidColor(_)
                | Self::InvalidParameter(_)
                | Self::PayloadTooLarge(_)
        )
    }
}
