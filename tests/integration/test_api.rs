//! Integration tests for the HTTP API.
//!
//! The router is served on an ephemeral port and driven with `reqwest`, the
//! way a browser front end would use it.

use std::path::Path;
use std::time::Duration;

use image::{ImageBuffer, Rgb};
use serde_json::{json, Value};
use shutterflow_engine::{create_router, AppState, Config, WorkflowEngine};

/// Encodes a uniform PNG.
fn png(rgb: [u8; 3]) -> Vec<u8> {
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(24, 24, Rgb(rgb));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes.into_inner()
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        upload_dir: dir.join("uploads"),
        capture_dir: dir.join("captures"),
        ..Config::default()
    };
    config.device.control_endpoint = "http://127.0.0.1:1/control".to_string();
    config.device.capture_endpoint = "http://127.0.0.1:1/capture".to_string();
    config.device.simulation.control_delay_ms = 5;
    config.device.simulation.capture_delay_ms = 5;
    config
}

/// Serves the API and returns its base URL.
async fn spawn_test_server(config: &Config) -> String {
    let engine = WorkflowEngine::from_config(config).expect("Failed to build engine");
    let router = create_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{addr}")
}

async fn upload(client: &reqwest::Client, base: &str, bytes: Vec<u8>) -> reqwest::Response {
    client
        .post(format!("{base}/api/upload?filename=reference.png"))
        .body(bytes)
        .send()
        .await
        .expect("Failed to send upload")
}

/// Tests the browser flow: upload, refine, capture, download, delete.
#[tokio::test]
async fn test_photo_session_over_http() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let base = spawn_test_server(&test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let response = upload(&client, &base, png([51, 51, 51])).await;
    assert!(response.status().is_success());
    let uploaded: Value = response.json().await.expect("Invalid upload response");
    assert_eq!(uploaded["currentStep"], "ready_for_refinement");
    let id = uploaded["sessionId"]
        .as_str()
        .expect("Missing session id")
        .to_string();

    let status: Value = client
        .get(format!("{base}/api/status/{id}"))
        .send()
        .await
        .expect("Failed to fetch status")
        .json()
        .await
        .expect("Invalid status response");
    assert_eq!(status["analysis"]["sceneType"], "night");
    assert_eq!(status["currentParameters"]["iso"], 800);

    let refined: Value = client
        .post(format!("{base}/api/refine"))
        .json(&json!({ "sessionId": id, "userInput": "iso 400 and sharper" }))
        .send()
        .await
        .expect("Failed to refine")
        .json()
        .await
        .expect("Invalid refine response");
    assert_eq!(refined["currentStep"], "capture_ready");
    assert_eq!(refined["currentParameters"]["iso"], 400);
    assert_eq!(refined["currentParameters"]["aperture"], "f/5.6");
    assert_eq!(refined["refinementHistory"].as_array().map(Vec::len), Some(1));

    let captured: Value = client
        .post(format!("{base}/api/capture/{id}"))
        .send()
        .await
        .expect("Failed to capture")
        .json()
        .await
        .expect("Invalid capture response");
    assert_eq!(captured["currentStep"], "completed");
    assert!(captured["capturedPhotoPath"].is_string());

    let photo = client
        .get(format!("{base}/api/photo/{id}"))
        .send()
        .await
        .expect("Failed to download photo");
    assert!(photo.status().is_success());
    assert!(!photo.bytes().await.expect("Empty photo body").is_empty());

    let deleted = client
        .delete(format!("{base}/api/session/{id}"))
        .send()
        .await
        .expect("Failed to delete session");
    assert!(deleted.status().is_success());

    let gone = client
        .get(format!("{base}/api/status/{id}"))
        .send()
        .await
        .expect("Failed to fetch status");
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
}

/// Tests that uploads which are not images are rejected and not stored.
#[tokio::test]
async fn test_upload_rejects_non_image() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = test_config(dir.path());
    let base = spawn_test_server(&config).await;
    let client = reqwest::Client::new();

    let response = upload(&client, &base, b"GIF89a but not really".to_vec()).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Invalid error body");
    assert!(body["error"].is_string());
    let stored = std::fs::read_dir(&config.upload_dir).map_or(0, Iterator::count);
    assert_eq!(stored, 0);

    let sessions: Value = client
        .get(format!("{base}/api/sessions"))
        .send()
        .await
        .expect("Failed to list sessions")
        .json()
        .await
        .expect("Invalid sessions response");
    assert_eq!(sessions["sessions"].as_array().map(Vec::len), Some(0));
}

/// Tests that unknown sessions and step names map to 404 and 400.
#[tokio::test]
async fn test_error_statuses() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let base = spawn_test_server(&test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(format!("{base}/api/refine"))
        .json(&json!({ "sessionId": "missing", "userInput": "brighter" }))
        .send()
        .await
        .expect("Failed to refine");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let uploaded: Value = upload(&client, &base, png([128, 128, 128]))
        .await
        .json()
        .await
        .expect("Invalid upload response");
    let id = uploaded["sessionId"].as_str().expect("Missing session id");

    let bad_step = client
        .post(format!("{base}/api/sessions/{id}/steps/zoom"))
        .send()
        .await
        .expect("Failed to run step");
    assert_eq!(bad_step.status(), reqwest::StatusCode::BAD_REQUEST);

    let good_step: Value = client
        .post(format!("{base}/api/sessions/{id}/steps/Refine"))
        .send()
        .await
        .expect("Failed to run step")
        .json()
        .await
        .expect("Invalid step response");
    assert_eq!(good_step["currentStep"], "capture_ready");
}

/// Tests the metadata endpoints.
#[tokio::test]
async fn test_workflow_and_health_endpoints() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let base = spawn_test_server(&test_config(dir.path())).await;
    let client = reqwest::Client::new();

    let workflow: Value = client
        .get(format!("{base}/api/workflow"))
        .send()
        .await
        .expect("Failed to fetch workflow")
        .json()
        .await
        .expect("Invalid workflow response");
    assert_eq!(
        workflow["steps"],
        json!(["upload", "analyze", "refine", "control", "capture"])
    );
    assert_eq!(
        workflow["controlTransports"],
        json!(["http", "shortcuts", "simulated"])
    );

    upload(&client, &base, png([90, 90, 90])).await;
    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .expect("Failed to fetch health")
        .json()
        .await
        .expect("Invalid health response");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["activeSessions"], 1);
}
