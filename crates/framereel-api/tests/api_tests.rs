//! API integration tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use framereel_api::{create_router, ApiConfig, AppState};
use framereel_media::{Encoder, ScriptedEncoder};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "framereel-test-boundary";
const PLACEHOLDER_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypisom";

struct TestApp {
    router: Router,
    encoder: Arc<ScriptedEncoder>,
    scratch: TempDir,
}

impl TestApp {
    fn new(encoder: ScriptedEncoder) -> Self {
        Self::with_config(encoder, |_| {})
    }

    fn with_config(encoder: ScriptedEncoder, configure: impl FnOnce(&mut ApiConfig)) -> Self {
        let scratch = TempDir::new().unwrap();
        let mut config = ApiConfig {
            scratch_dir: scratch.path().join("sessions"),
            ..Default::default()
        };
        configure(&mut config);

        let encoder = Arc::new(encoder);
        let dyn_encoder: Arc<dyn Encoder> = encoder.clone();
        let state = AppState::with_encoder(config, dyn_encoder);

        Self {
            router: create_router(state, None),
            encoder,
            scratch,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        tokio_test::assert_ok!(self.router.clone().oneshot(request).await)
    }

    fn sessions_dir(&self) -> std::path::PathBuf {
        self.scratch.path().join("sessions")
    }
}

fn png(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 6, Rgb([shade, 64, 255 - shade]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(files: &[(&str, Vec<u8>)], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files[]\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn convert_request(files: &[(&str, Vec<u8>)], fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/convert")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body(files, fields)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn shape_frames(count: usize) -> Vec<(String, Vec<u8>)> {
    (1..=count)
        .map(|i| (format!("shape_{:03}.png", i), png(i as u8)))
        .collect()
}

fn as_parts(frames: &[(String, Vec<u8>)]) -> Vec<(&str, Vec<u8>)> {
    frames.iter().map(|(n, d)| (n.as_str(), d.clone())).collect()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn is_empty_or_missing(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_convert_mp4_streams_attachment() {
    let app = TestApp::new(ScriptedEncoder::succeeding(3));
    let frames = shape_frames(3);

    let response = app.send(convert_request(&as_parts(&frames), &[("format", "mp4")])).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"output.mp4\""
    );
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        PLACEHOLDER_VIDEO.len().to_string().as_str()
    );

    assert_eq!(body_bytes(response).await, PLACEHOLDER_VIDEO);

    let jobs = app.encoder.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].total_frames, 3);
    assert_eq!(jobs[0].fps, 30);
    let args = jobs[0].command().build_args();
    assert!(args.iter().any(|a| a.ends_with("frame_%06d.png")));
    assert!(args.contains(&"libx264".to_string()));
    assert!(args.contains(&"yuv420p".to_string()));

    // The body owned the session; it is gone once the body is consumed
    assert!(is_empty_or_missing(&app.sessions_dir()));
}

#[tokio::test]
async fn test_convert_defaults_to_mp4() {
    let app = TestApp::new(ScriptedEncoder::succeeding(2));
    let frames = shape_frames(2);

    let response = app.send(convert_request(&as_parts(&frames), &[])).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
}

#[tokio::test]
async fn test_convert_mov_with_fps_override() {
    let app = TestApp::new(ScriptedEncoder::succeeding(2));
    let frames = shape_frames(2);

    let response = app
        .send(convert_request(&as_parts(&frames), &[("format", "mov"), ("fps", "24")]))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/quicktime");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"output.mov\""
    );
    body_bytes(response).await;

    let jobs = app.encoder.jobs();
    assert_eq!(jobs[0].fps, 24);
    assert!(jobs[0].command().build_args().contains(&"prores_ks".to_string()));
}

#[tokio::test]
async fn test_too_many_frames_is_rejected_before_staging() {
    let app = TestApp::with_config(ScriptedEncoder::succeeding(3), |config| config.max_frames = 2);
    let frames = shape_frames(3);

    let response = app.send(convert_request(&as_parts(&frames), &[])).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "too_many_frames");
    assert_eq!(body["error"], "Maximum 2 files allowed, received 3");
    assert!(app.encoder.jobs().is_empty());
    assert!(is_empty_or_missing(&app.sessions_dir()));
}

#[tokio::test]
async fn test_no_valid_frames() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app
        .send(convert_request(&[("notes.txt", b"hello".to_vec()), ("cover.png", png(1))], &[]))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "no_valid_frames");
    assert_eq!(body["error"], "No valid PNG files found");
}

#[tokio::test]
async fn test_missing_files_field() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app.send(convert_request(&[], &[("format", "mp4")])).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No files provided");
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn test_unsupported_format() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));
    let frames = shape_frames(1);

    let response = app
        .send(convert_request(&as_parts(&frames), &[("format", "webm")]))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "unsupported_format");
    assert!(is_empty_or_missing(&app.sessions_dir()));
}

#[tokio::test]
async fn test_invalid_fps_field() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));
    let frames = shape_frames(1);

    let response = app
        .send(convert_request(&as_parts(&frames), &[("fps", "fast")]))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid fps: fast");
}

#[tokio::test]
async fn test_encoder_failure_reports_error_and_cleans_up() {
    let app = TestApp::new(ScriptedEncoder::failing(
        "[image2 @ 0x1] Could not open file\nConversion failed!",
        1,
    ));
    let frames = shape_frames(3);

    let response = app.send(convert_request(&as_parts(&frames), &[])).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "encoding_failed");
    assert_eq!(body["error"], "FFmpeg encoding failed with exit code 1");
    assert!(is_empty_or_missing(&app.sessions_dir()));

    let progress = body_json(app.send(get("/api/progress")).await).await;
    assert_eq!(progress["progress"], 0.0);
    assert!(progress["message"].as_str().unwrap().starts_with("Error: "));
}

#[tokio::test]
async fn test_progress_reports_completion() {
    let app = TestApp::new(ScriptedEncoder::succeeding(2));

    let idle = body_json(app.send(get("/api/progress")).await).await;
    assert_eq!(idle["progress"], 0.0);

    let frames = shape_frames(2);
    let response = app.send(convert_request(&as_parts(&frames), &[])).await;
    body_bytes(response).await;

    let done = body_json(app.send(get("/api/progress")).await).await;
    assert_eq!(done["progress"], 100.0);
    assert_eq!(done["message"], "Complete");
}

#[tokio::test]
async fn test_service_info_endpoints() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let index = body_json(app.send(get("/api/")).await).await;
    assert_eq!(index["version"], env!("CARGO_PKG_VERSION"));
    assert!(index["message"].is_string());

    for uri in ["/api/status", "/api/flask-status"] {
        let status = body_json(app.send(get(uri)).await).await;
        assert_eq!(status["status"], "running");
        assert!(status["timestamp"].is_string());
    }

    let health = app.send(get("/health")).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_checks() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app.send(get("/ready")).await;

    // The encoder check depends on FFmpeg being installed on the test host
    assert!(matches!(
        response.status(),
        StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE
    ));
    let body = body_json(response).await;
    assert_eq!(body["checks"]["scratch"]["status"], "ok");
    assert!(body["checks"]["encoder"]["status"].is_string());
}

#[tokio::test]
async fn test_metrics_disabled_is_not_found() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app.send(get("/metrics")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_exposes_content_disposition() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/convert")
                .header("Origin", "http://localhost:3000")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let app = TestApp::new(ScriptedEncoder::succeeding(1));

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let headers = response.headers();
    assert_eq!(headers["X-Content-Type-Options"], "nosniff");
    assert_eq!(headers["X-Frame-Options"], "DENY");
    assert_eq!(headers["X-Request-ID"], "req-123");
}

#[tokio::test]
async fn test_convert_is_rate_limited_per_client() {
    let app = TestApp::with_config(ScriptedEncoder::succeeding(1), |config| config.rate_limit_rps = 1);

    let request = |ip: &str| {
        let mut request = convert_request(&[], &[]);
        request
            .headers_mut()
            .insert("X-Forwarded-For", ip.parse().unwrap());
        request
    };

    let first = app.send(request("203.0.113.9")).await;
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = app.send(request("203.0.113.9")).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(second).await["code"], "rate_limited");

    let other = app.send(request("203.0.113.10")).await;
    assert_eq!(other.status(), StatusCode::BAD_REQUEST);
}
