//! Multipart form parsing into typed requests

use crate::{
    border::BorderOptions,
    error::{BgRemovalError, Result},
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart,
    },
    http::StatusCode,
};

pub const IMAGE_FIELD: &str = "image";
pub const BORDER_COLOR_FIELD: &str = "border_color";
pub const BORDER_THICKNESS_FIELD: &str = "border_thickness";

/// Raw fields of an upload form; unknown fields and a non-file `image` part
/// are dropped
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<Bytes>,
    pub border_color: Option<String>,
    pub border_thickness: Option<String>,
}

impl UploadForm {
    /// Drain a multipart body
    ///
    /// A request that is not multipart at all is treated as carrying no image.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if the body exceeds `max_body_size`
    /// - `InvalidParameter` for a malformed multipart stream
    pub async fn read(
        multipart: std::result::Result<Multipart, MultipartRejection>,
        max_body_size: usize,
    ) -> Result<Self> {
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(rejection) => {
                tracing::debug!("request is not multipart: {rejection}");
                return Ok(Self::default());
            },
        };

        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e, max_body_size))?
        {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                // Only a file part counts as an upload, never a plain text value
                IMAGE_FIELD if field.file_name().is_none() => {
                    tracing::debug!("ignoring non-file image field");
                },
                IMAGE_FIELD => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(&e, max_body_size))?;
                    form.image = Some(bytes);
                },
                BORDER_COLOR_FIELD => {
                    form.border_color = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| multipart_error(&e, max_body_size))?,
                    );
                },
                BORDER_THICKNESS_FIELD => {
                    form.border_thickness = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| multipart_error(&e, max_body_size))?,
                    );
                },
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    fn take_image(&mut self) -> Result<Bytes> {
        self.image.take().ok_or(BgRemovalError::MissingInput)
    }
}

fn multipart_error(error: &MultipartError, max_body_size: usize) -> BgRemovalError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        BgRemovalError::PayloadTooLarge(max_body_size)
    } else {
        BgRemovalError::invalid_parameter(format!("malformed multipart body: {}", error.body_text()))
    }
}

/// `/remove-bg` input
#[derive(Debug)]
pub struct RemoveBackgroundRequest {
    pub image: Bytes,
}

impl RemoveBackgroundRequest {
    /// # Errors
    /// - `MissingInput` if no image was uploaded
    pub fn from_form(mut form: UploadForm) -> Result<Self> {
        Ok(Self {
            image: form.take_image()?,
        })
    }
}

/// `/add-border` input
#[derive(Debug)]
pub struct AddBorderRequest {
    pub image: Bytes,
    pub options: BorderOptions,
}

impl AddBorderRequest {
    /// The image is checked before the border parameters
    ///
    /// # Errors
    /// - `MissingInput` if no image was uploaded
    /// - `InvalidColor` or `InvalidParameter` for bad border fields
    pub fn from_form(mut form: UploadForm) -> Result<Self> {
        let image = form.take_image()?;
        let options = BorderOptions::from_form(
            form.border_color.as_deref(),
            form.border_thickness.as_deref(),
        )?;
        Ok(Self { image, options })
    }
}
