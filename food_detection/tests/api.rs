//! Router-level tests for the detection API, driven through `oneshot` with a
//! stub classifier in place of the ONNX model.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use food_detection::{
    catalog::ClassCatalog,
    config::ImageConfig,
    detection_service::DetectionService,
    labels::ClassNames,
    lifecycle::ModelLifecycle,
    model_service::{InferenceError, ModelLoadError, ModelService, RawDetection},
    server::{create_router, SharedState},
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::{io::Cursor, sync::Arc};
use tower::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "food-detection-test-boundary";

struct StubModelService {
    class_names: ClassNames,
}

impl StubModelService {
    fn new() -> Self {
        Self {
            class_names: vec![
                (0, "ana-yemek".to_string()),
                (1, "cay".to_string()),
                (2, "cikolata".to_string()),
                (3, "corba".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ModelService for StubModelService {
    fn infer(
        &self,
        image: &RgbImage,
        _confidence_floor: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let (width, height) = image.dimensions();
        Ok(vec![
            RawDetection {
                class_id: 3,
                confidence: 0.95,
                x1: width as f32 * 0.25,
                y1: height as f32 * 0.25,
                x2: width as f32 * 0.75,
                y2: height as f32 * 0.75,
            },
            RawDetection {
                class_id: 1,
                confidence: 0.4,
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0,
            },
        ])
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }
}

async fn app(model: Result<StubModelService, ModelLoadError>) -> Router {
    let lifecycle = Arc::new(ModelLifecycle::new());
    lifecycle.load_with(move || model).await;

    let catalog = Arc::new(ClassCatalog::embedded().expect("embedded catalog"));
    let service = DetectionService::new(lifecycle, catalog, ImageConfig::default());

    create_router(SharedState::new(service), 32 * 1024 * 1024)
}

async fn ready_app() -> Router {
    app(Ok(StubModelService::new())).await
}

async fn failed_app() -> Router {
    app(Err(ModelLoadError::NotFound("best.onnx".into()))).await
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 160, 30])));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn multipart_request(field: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(filename) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n",
            field, filename
        ),
        None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n{}\r\n", BOUNDARY, disposition).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_liveness() {
    let (status, body) = send(ready_app().await, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "message": "Food Detection API" }));
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let (status, body) = send(ready_app().await, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy", "model_loaded": true }));

    let (status, body) = send(failed_app().await, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy", "model_loaded": false }));
}

#[tokio::test]
async fn test_detect_oversized_tray() {
    let request = multipart_request("file", Some("tray.png"), &png(2000, 1000));
    let (status, body) = send(ready_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["image_width"], 1280);
    assert_eq!(body["image_height"], 640);
    assert_eq!(
        body["detections"][0],
        json!({
            "class_id": 3,
            "label": "corba",
            "confidence": 0.95,
            "price": 35.0,
            "calories": 150,
            "box": { "x1": 320.0, "y1": 160.0, "x2": 960.0, "y2": 480.0 }
        })
    );
}

#[tokio::test]
async fn test_detect_without_model() {
    let request = multipart_request("file", Some("tray.png"), &png(64, 64));
    let (status, body) = send(failed_app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "error": "Model yüklenemedi", "detections": [] }));
}

#[tokio::test]
async fn test_detect_non_image_keeps_serving() {
    let app = ready_app().await;

    let request = multipart_request("file", Some("notes.txt"), b"this is not a picture");
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert_eq!(body["detections"], json!([]));
    assert!(body.get("success").is_none());

    let request = multipart_request("file", Some("tray.png"), &png(32, 32));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_detect_requires_file_field() {
    let request = multipart_request("comment", None, b"hello");
    let (status, body) = send(ready_app().await, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detections"], json!([]));
}

fn json_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "tray.png"}"#))
        .unwrap()
}

#[tokio::test]
async fn test_detect_rejects_non_multipart_body_with_error_payload() {
    let (status, body) = send(ready_app().await, json_post("/detect")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert_eq!(body["detections"], json!([]));
}

#[tokio::test]
async fn test_detect_non_multipart_without_model() {
    let (status, body) = send(failed_app().await, json_post("/detect")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "error": "Model yüklenemedi", "detections": [] }));
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/detect")
        .header(header::ORIGIN, "https://kiosk.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = ready_app().await.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
