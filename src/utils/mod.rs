//! Shared image utilities

pub mod color;
pub mod foreground;
pub mod preprocessing;

pub use color::BorderColor;
pub use foreground::estimate_foreground;
pub use preprocessing::ImagePreprocessor;
