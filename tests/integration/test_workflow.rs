//! End-to-end workflow tests for Shutterflow
//!
//! These tests drive the engine the way the HTTP layer and CLI do: photos go
//! in as bytes, device chains are built from configuration, and captures land
//! on disk. The camera is either the simulated tier or a fake HTTP device
//! served on an ephemeral port.

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use image::{ImageBuffer, Rgb};
use serde_json::{json, Value};
use shutterflow_engine::{
    Config, FocusMode, SceneMode, SceneType, Step, WhiteBalance, WorkflowEngine, WorkflowStage,
};

/// Encodes a uniform PNG.
fn png(size: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(size, size, Rgb(rgb));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes.into_inner()
}

/// Config whose HTTP device is unreachable, so every action falls through
/// to the simulated tier.
fn simulated_config(dir: &Path) -> Config {
    let mut config = Config {
        upload_dir: dir.join("uploads"),
        capture_dir: dir.join("captures"),
        ..Config::default()
    };
    config.device.control_endpoint = "http://127.0.0.1:1/control".to_string();
    config.device.capture_endpoint = "http://127.0.0.1:1/capture".to_string();
    config.device.simulation.control_delay_ms = 10;
    config.device.simulation.capture_delay_ms = 10;
    config.validate().expect("Test config should be valid");
    config
}

fn engine(config: &Config) -> WorkflowEngine {
    WorkflowEngine::from_config(config).expect("Failed to build engine")
}

// ============================================================================
// Scenario Tests
// ============================================================================

/// A dark reference photo is classified as night and gets night settings.
#[tokio::test]
async fn test_dark_photo_recommends_night_settings() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));

    let session = engine
        .upload_photo(&png(32, [51, 51, 51]), "dusk.png")
        .await
        .expect("Upload failed");

    assert_eq!(session.current_step, WorkflowStage::ReadyForRefinement);
    let analysis = session.analysis.expect("Analysis missing");
    assert_eq!(analysis.scene_type, SceneType::Night);
    assert!((analysis.brightness - 0.2).abs() < 1e-9);

    let params = session.current_parameters.expect("Recommendation missing");
    assert_eq!(params.aperture.as_deref(), Some("f/1.6"));
    assert_eq!(params.iso, Some(800));
    assert_eq!(params.exposure_compensation, Some(1.0));
    assert_eq!(params.scene_mode, Some(SceneMode::Night));
}

/// Feedback changes only the fields it names and is recorded as a delta.
#[tokio::test]
async fn test_warmer_and_blurred_background() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "studio.png")
        .await
        .expect("Upload failed");
    let before = session.current_parameters.clone().expect("Recommendation missing");
    assert_eq!(before.white_balance, Some(WhiteBalance::Auto));

    let refined = engine
        .apply_refinement(&session.session_id, "make it warmer and blur the background")
        .await
        .expect("Refinement call failed");

    assert_eq!(refined.current_step, WorkflowStage::CaptureReady);
    let params = refined.current_parameters.expect("Parameters missing");
    assert_eq!(params.white_balance, Some(WhiteBalance::Incandescent));
    assert_eq!(params.aperture.as_deref(), Some("f/1.6"));
    assert_eq!(params.focus_mode, before.focus_mode);
    assert_eq!(params.scene_mode, before.scene_mode);
    assert_eq!(params.exposure_compensation, before.exposure_compensation);

    let record = &refined.refinement_history[0];
    assert_eq!(record.applied_delta.white_balance, Some(WhiteBalance::Incandescent));
    assert_eq!(record.applied_delta.aperture.as_deref(), Some("f/1.6"));
    assert_eq!(record.applied_delta.field_names().len(), 2);
}

/// Unrecognized feedback leaves the session where it was.
#[tokio::test]
async fn test_unrecognized_feedback() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "studio.png")
        .await
        .expect("Upload failed");

    let after = engine
        .apply_refinement(&session.session_id, "xyzzy")
        .await
        .expect("Refinement call failed");

    assert_eq!(after.current_step, session.current_step);
    assert!(after.refinement_history.is_empty());
    assert_eq!(after.current_parameters, session.current_parameters);
    let error = after.error_message.expect("Error should be recorded");
    assert!(error.contains("No adjustment recognized"));
}

/// A full run with an unreachable camera completes through simulation and
/// keeps one record per refinement.
#[tokio::test]
async fn test_full_run_with_simulated_camera() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));
    let session = engine
        .upload_photo(&png(32, [200, 180, 160]), "beach.png")
        .await
        .expect("Upload failed");

    engine
        .apply_refinement(&session.session_id, "increase exposure")
        .await
        .expect("Refinement call failed");
    engine
        .apply_refinement(&session.session_id, "use daylight white balance")
        .await
        .expect("Refinement call failed");

    let done = engine
        .run_full_workflow(&session.session_id)
        .await
        .expect("Workflow failed");

    assert_eq!(done.current_step, WorkflowStage::Completed);
    assert!(done.error_message.is_none());
    let photo = done.captured_photo_path.expect("No capture recorded");
    assert!(!photo.as_os_str().is_empty());
    assert!(photo.starts_with(dir.path().join("captures")));
    assert!(photo.exists());
    assert_eq!(done.refinement_history.len(), 2);
}

// ============================================================================
// Refinement Properties
// ============================================================================

/// Repeated brightening saturates at the exposure ceiling.
#[tokio::test]
async fn test_repeated_brightening_saturates() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));
    let session = engine
        .upload_photo(&png(32, [51, 51, 51]), "dusk.png")
        .await
        .expect("Upload failed");

    let mut latest = session;
    for _ in 0..6 {
        latest = engine
            .apply_refinement(&latest.session_id, "increase brightness")
            .await
            .expect("Refinement call failed");
    }

    let params = latest.current_parameters.expect("Parameters missing");
    assert_eq!(params.exposure_compensation, Some(3.0));
    assert_eq!(latest.refinement_history.len(), 6);

    // Night settings start at +1.0, so only four steps move the value
    let applied: Vec<f64> = latest
        .refinement_history
        .iter()
        .map(|r| r.applied_delta.exposure_compensation.unwrap_or_default())
        .collect();
    assert_eq!(applied, vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
}

/// The history records the ISO that was applied, not the one asked for.
#[tokio::test]
async fn test_history_records_clamped_iso() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = engine(&simulated_config(dir.path()));
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "street.png")
        .await
        .expect("Upload failed");

    let refined = engine
        .apply_refinement(&session.session_id, "iso 6400")
        .await
        .expect("Refinement call failed");

    let params = refined.current_parameters.expect("Parameters missing");
    assert_eq!(params.iso, Some(3200));
    assert_eq!(refined.refinement_history[0].applied_delta.iso, params.iso);
}

/// Step sizes come from the refinement section of the config file.
#[tokio::test]
async fn test_refinement_step_sizes_from_config_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_json = json!({
        "uploadDir": dir.path().join("uploads"),
        "captureDir": dir.path().join("captures"),
        "refinement": { "exposureStep": 1.0, "isoRaise": 1600 }
    });
    std::fs::write(
        dir.path().join("shutterflow.json"),
        serde_json::to_string_pretty(&config_json).expect("Failed to encode config"),
    )
    .expect("Failed to write config");

    let config = Config::load_from_dir(dir.path()).expect("Failed to load config");
    assert_eq!(config.refinement.iso_lower, 200);
    let engine = engine(&config);
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "studio.png")
        .await
        .expect("Upload failed");

    let refined = engine
        .apply_refinement(&session.session_id, "brighter and raise the iso")
        .await
        .expect("Refinement call failed");

    let params = refined.current_parameters.expect("Parameters missing");
    assert_eq!(params.exposure_compensation, Some(1.0));
    assert_eq!(params.iso, Some(1600));
}

// ============================================================================
// Step Semantics
// ============================================================================

/// Running upload again neither moves the photo nor stores another copy.
#[tokio::test]
async fn test_repeated_upload_step_is_idempotent() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = simulated_config(dir.path());
    let engine = engine(&config);
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "studio.png")
        .await
        .expect("Upload failed");

    let again = engine
        .run_step(&session.session_id, Step::Upload)
        .await
        .expect("Step failed");

    assert_eq!(again.reference_photo_path, session.reference_photo_path);
    assert_eq!(again.current_step, WorkflowStage::ReadyForRefinement);
    let stored = std::fs::read_dir(&config.upload_dir)
        .expect("Upload dir missing")
        .count();
    assert_eq!(stored, 1);
}

/// With no simulated tier and no reachable camera, control fails and stays
/// retryable.
#[tokio::test]
async fn test_unreachable_camera_without_simulation() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = simulated_config(dir.path());
    config.device.simulation.enabled = false;
    let engine = engine(&config);
    let session = engine
        .upload_photo(&png(32, [128, 128, 128]), "studio.png")
        .await
        .expect("Upload failed");

    let state = engine
        .run_full_workflow(&session.session_id)
        .await
        .expect("Workflow failed");

    assert_eq!(state.current_step, WorkflowStage::CaptureReady);
    assert!(state.captured_photo_path.is_none());
    let error = state.error_message.expect("Error should be recorded");
    assert!(error.contains("set_camera_params"));
    assert!(error.contains("shortcuts"));
}

/// Sessions run side by side without interfering.
#[tokio::test]
async fn test_parallel_sessions_complete() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let engine = Arc::new(engine(&simulated_config(dir.path())));

    let runs = (0..4u8).map(|i| {
        let engine = Arc::clone(&engine);
        async move {
            let session = engine
                .upload_photo(&png(24, [60 * i, 100, 140]), "batch.png")
                .await
                .expect("Upload failed");
            engine
                .run_full_workflow(&session.session_id)
                .await
                .expect("Workflow failed")
        }
    });
    let results = join_all(runs).await;

    assert_eq!(results.len(), 4);
    assert!(results
        .iter()
        .all(|s| s.current_step == WorkflowStage::Completed));
    let mut photos: Vec<_> = results
        .iter()
        .filter_map(|s| s.captured_photo_path.clone())
        .collect();
    photos.sort();
    photos.dedup();
    assert_eq!(photos.len(), 4);
    assert_eq!(engine.list_sessions().await.len(), 4);
}

// ============================================================================
// Fake HTTP Camera
// ============================================================================

/// Spawns a camera that accepts pushes, captures, and serves the photo.
/// Returns its base URL and the bodies it received.
async fn spawn_fake_camera(photo: Vec<u8>) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));

    let control_log = Arc::clone(&received);
    let capture_log = Arc::clone(&received);
    let router = Router::new()
        .route(
            "/control",
            post(move |Json(body): Json<Value>| async move {
                control_log.lock().expect("Log poisoned").push(body);
                Json(json!({ "success": true }))
            }),
        )
        .route(
            "/capture",
            post(move |Json(body): Json<Value>| async move {
                capture_log.lock().expect("Log poisoned").push(body);
                Json(json!({ "success": true, "photo_url": "/photos/latest.png" }))
            }),
        )
        .route("/photos/latest.png", get(move || async move { photo }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Fake camera failed");
    });

    (format!("http://{addr}"), received)
}

/// A reachable camera is driven over HTTP and its photo is downloaded.
#[tokio::test]
async fn test_http_camera_end_to_end() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let served_photo = png(8, [10, 200, 30]);
    let (base, received) = spawn_fake_camera(served_photo.clone()).await;

    let mut config = simulated_config(dir.path());
    config.device.control_endpoint = format!("{base}/control");
    config.device.capture_endpoint = format!("{base}/capture");
    config.device.simulation.enabled = false;
    let engine = engine(&config);

    let session = engine
        .upload_photo(&png(32, [51, 51, 51]), "dusk.png")
        .await
        .expect("Upload failed");
    engine
        .apply_refinement(&session.session_id, "macro focus")
        .await
        .expect("Refinement call failed");
    let done = engine
        .capture_photo(&session.session_id)
        .await
        .expect("Capture failed");

    assert_eq!(done.current_step, WorkflowStage::Completed);
    assert_eq!(
        done.current_parameters.and_then(|p| p.focus_mode),
        Some(FocusMode::Macro)
    );
    let photo = done.captured_photo_path.expect("No capture recorded");
    assert_eq!(std::fs::read(&photo).expect("Capture missing"), served_photo);

    let received = received.lock().expect("Log poisoned").clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0]["action"], "set_camera_params");
    assert_eq!(received[0]["params"]["iso"], 800);
    assert_eq!(received[0]["params"]["aperture"], 1.6);
    assert_eq!(received[0]["params"]["focus"], "macro");
    assert_eq!(received[0]["params"]["scene_mode"], "night");
    assert_eq!(received[1]["action"], "capture_photo");
    assert!(received[1]["timestamp"].is_string());
}
