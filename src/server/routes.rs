//! Router construction

use super::{handlers, state::AppState};
use crate::tracing_config::spans;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
        spans::request(&request_id, request.method().as_str(), request.uri().path())
    });

    Router::new()
        .route("/remove-bg", post(handlers::remove_background))
        .route("/add-border", post(handlers::add_border))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.max_body_size))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::test_utils::MockSegmentationBackend,
        config::{InferenceConfig, RemovalOptions},
        processor::{BackgroundRemovalProcessor, ModelHandle},
        services::ImageIOService,
    };
    use axum::{
        http::{header, StatusCode},
        response::Response,
    };
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "bgremove-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                },
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                },
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn mock_state() -> AppState {
        let backend = Box::new(MockSegmentationBackend::new(16));
        let model = Arc::new(ModelHandle::load(backend, &InferenceConfig::default()).unwrap());
        AppState::new(BackgroundRemovalProcessor::new(model, RemovalOptions::default()))
    }

    /// 30x30 transparent canvas with an opaque 10x10 white square in the middle
    fn square_png() -> Vec<u8> {
        let image = RgbaImage::from_fn(30, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        ImageIOService::encode_png(&image).unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> Response {
        create_router(state).oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn png_body(response: Response) -> RgbaImage {
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        ImageIOService::decode_rgba(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let response = send(mock_state(), request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["model_loaded"], true);
        assert_eq!(json["backend"], "mock");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_without_model() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let json = json_body(send(AppState::without_model(), request).await).await;
        assert_eq!(json["model_loaded"], false);
        assert!(json.get("backend").is_none());
    }

    #[tokio::test]
    async fn test_add_border_draws_ring() {
        let png = square_png();
        let request = multipart_request(
            "/add-border",
            &[
                Part::File("image", &png),
                Part::Text("border_color", "#0000FF"),
                Part::Text("border_thickness", "2"),
            ],
        );
        let response = send(AppState::without_model(), request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let image = png_body(response).await;
        assert_eq!(image.dimensions(), (30, 30));
        assert_eq!(*image.get_pixel(15, 15), Rgba([255, 255, 255, 255]));
        assert_eq!(*image.get_pixel(9, 15), Rgba([0, 0, 255, 255]));
        assert_eq!(*image.get_pixel(8, 15), Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(7, 15)[3], 0);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
    }

    #[tokio::test]
    async fn test_add_border_uses_defaults() {
        let png = square_png();
        let request = multipart_request("/add-border", &[Part::File("image", &png)]);
        let image = png_body(send(AppState::without_model(), request).await).await;

        // default: red, thickness 5
        assert_eq!(*image.get_pixel(5, 15), Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(4, 15)[3], 0);
    }

    #[tokio::test]
    async fn test_add_border_ignores_unknown_fields() {
        let png = square_png();
        let request = multipart_request(
            "/add-border",
            &[Part::Text("note", "hello"), Part::File("image", &png)],
        );
        let response = send(AppState::without_model(), request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_image() {
        for uri in ["/add-border", "/remove-bg"] {
            let request = multipart_request(uri, &[Part::Text("border_color", "#00FF00")]);
            let response = send(mock_state(), request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                json_body(response).await,
                serde_json::json!({ "error": "No image uploaded" })
            );
        }
    }

    #[tokio::test]
    async fn test_text_image_field_is_not_an_upload() {
        for uri in ["/add-border", "/remove-bg"] {
            let request = multipart_request(uri, &[Part::Text("image", "iVBORw0KGgoAAAANSUhEUg")]);
            let response = send(mock_state(), request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json_body(response).await["error"], "No image uploaded");
        }
    }

    #[tokio::test]
    async fn test_non_multipart_request_has_no_image() {
        let request = Request::post("/add-border")
            .body(Body::from("plain text"))
            .unwrap();
        let response = send(mock_state(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No image uploaded");
    }

    #[tokio::test]
    async fn test_invalid_image() {
        for uri in ["/add-border", "/remove-bg"] {
            let request = multipart_request(uri, &[Part::File("image", b"not an image")]);
            let response = send(mock_state(), request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let json = json_body(response).await;
            assert!(
                json["error"].as_str().unwrap().starts_with("Invalid image: "),
                "{json}"
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_border_fields() {
        let png = square_png();
        let request = multipart_request(
            "/add-border",
            &[Part::File("image", &png), Part::Text("border_color", "#12345")],
        );
        let response = send(AppState::without_model(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid color: "));

        let request = multipart_request(
            "/add-border",
            &[Part::File("image", &png), Part::Text("border_thickness", "thick")],
        );
        let response = send(AppState::without_model(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid parameter: border thickness"));
    }

    #[tokio::test]
    async fn test_remove_background() {
        let source = RgbaImage::from_pixel(40, 40, Rgba([20, 200, 20, 255]));
        let png = ImageIOService::encode_png(&source).unwrap();
        let request = multipart_request("/remove-bg", &[Part::File("image", &png)]);
        let response = send(mock_state(), request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let image = png_body(response).await;
        assert_eq!(image.dimensions(), (40, 40));
        assert!(image.get_pixel(20, 20)[3] > 250);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
    }

    #[tokio::test]
    async fn test_remove_background_without_model() {
        let png = square_png();
        let request = multipart_request("/remove-bg", &[Part::File("image", &png)]);
        let response = send(AppState::without_model(), request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let png = vec![0u8; 4096];
        let request = multipart_request("/add-border", &[Part::File("image", &png)]);
        let state = AppState::without_model().with_max_body_size(1024);
        let response = send(state, request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            json_body(response).await["error"],
            "Upload exceeds the 1024 byte limit"
        );
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let request = Request::get("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = send(AppState::without_model(), request).await;
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
