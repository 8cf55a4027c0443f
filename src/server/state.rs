//! Shared application state

use crate::{config::DEFAULT_MAX_BODY_SIZE, processor::BackgroundRemovalProcessor};
use chrono::{DateTime, Utc};

/// State handed to every handler
///
/// Cloned per request; the model itself sits behind an `Arc` inside the
/// processor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// `None` serves `/add-border` only; `/remove-bg` then fails with 500
    pub processor: Option<BackgroundRemovalProcessor>,
    pub max_body_size: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(processor: BackgroundRemovalProcessor) -> Self {
        Self {
            processor: Some(processor),
            ..Self::without_model()
        }
    }

    /// State with no segmentation model loaded
    #[must_use]
    pub fn without_model() -> Self {
        Self {
            processor: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    #[must_use]
    pub fn model_loaded(&self) -> bool {
        self.processor.is_some()
    }
}
