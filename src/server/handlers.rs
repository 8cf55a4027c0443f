//! Request handlers

use super::{
    form::{AddBorderRequest, RemoveBackgroundRequest, UploadForm},
    state::AppState,
};
use crate::{
    border::BorderCompositor,
    error::{BgRemovalError, Result},
    services::ImageIOService,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Run CPU-bound work on the blocking pool
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| BgRemovalError::internal(format!("processing task failed: {e}")))?
}

fn png_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
}

/// `POST /remove-bg`
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let form = UploadForm::read(multipart, state.max_body_size).await?;
    let request = RemoveBackgroundRequest::from_form(form)?;
    let processor = state
        .processor
        .clone()
        .ok_or_else(|| BgRemovalError::model("no segmentation model is loaded"))?;

    let upload_size = request.image.len();
    let (png, timings) = run_blocking(move || {
        let result = processor.process_bytes(&request.image)?;
        Ok((result.to_png_bytes()?, result.timings))
    })
    .await?;

    info!(
        upload_size,
        response_size = png.len(),
        "Background removed: {}",
        timings.summary()
    );
    Ok(png_response(png))
}

/// `POST /add-border`
pub async fn add_border(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let form = UploadForm::read(multipart, state.max_body_size).await?;
    let AddBorderRequest { image, options } = AddBorderRequest::from_form(form)?;

    let png = run_blocking(move || {
        let image = ImageIOService::decode_rgba(&image)?;
        let bordered = BorderCompositor::draw_border(&image, &options);
        ImageIOService::encode_png(&bordered)
    })
    .await?;

    info!(
        color = %options.color,
        thickness = options.thickness,
        response_size = png.len(),
        "Border added"
    );
    Ok(png_response(png))
}

/// `GET /health` body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub uptime_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.processor.as_ref().map(|processor| processor.model());
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: state.model_loaded(),
        backend: model.map(|m| m.backend_name()),
        model: model.map(|m| m.info().name.clone()),
        uptime_seconds: (now - state.started_at).num_seconds(),
        timestamp: now,
    })
}
