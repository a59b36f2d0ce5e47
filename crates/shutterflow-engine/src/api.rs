//! HTTP API for the Shutterflow workflow engine.
//!
//! # Endpoints
//!
//! - `POST /api/upload?filename=` - Store a reference photo and analyze it
//! - `GET /api/status/:id` - Full session state
//! - `POST /api/refine` - Apply free-text feedback
//! - `POST /api/capture/:id` - Push parameters and capture
//! - `POST /api/sessions/:id/steps/:step` - Run one named step
//! - `GET /api/photo/:id` - Bytes of the latest capture
//! - `DELETE /api/session/:id` - End a session and delete its files
//! - `GET /api/sessions` - List sessions
//! - `GET /api/workflow` - Workflow description
//! - `GET /api/health` - Liveness and session count
//!
//! # Example
//!
//! ```no_run
//! use shutterflow_engine::{create_router, AppState, Config, WorkflowEngine};
//!
//! # async fn example() -> shutterflow_engine::Result<()> {
//! let config = Config::default();
//! let engine = WorkflowEngine::from_config(&config)?;
//! let router = create_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::ShutterflowError;
use crate::session::{SessionState, WorkflowStage};
use crate::workflow::{SessionSummary, WorkflowEngine};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query string of the upload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadQuery {
    /// Original file name; only its extension is kept.
    #[serde(default)]
    pub filename: Option<String>,
}

/// Response body for the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Identifier of the new session.
    pub session_id: String,
    /// Stage reached after analysis.
    pub current_step: WorkflowStage,
    /// Analysis failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Request body for the refine endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    /// Session to refine.
    pub session_id: String,
    /// Free-text feedback.
    pub user_input: String,
}

/// Response body for the delete endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    /// Whether the session was ended.
    pub deleted: bool,
    /// Number of files removed from disk.
    pub files_removed: usize,
}

/// Response body for the sessions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    /// One entry per active session.
    pub sessions: Vec<SessionSummary>,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Server time.
    pub timestamp: DateTime<Utc>,
    /// Number of active sessions.
    pub active_sessions: usize,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The engine every handler drives.
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    /// Wraps an engine for sharing across handlers.
    #[must_use]
    pub fn new(engine: WorkflowEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Shares an engine that is also used elsewhere (e.g. by a reaper task).
    #[must_use]
    pub const fn with_engine(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for API handlers.
#[derive(Debug)]
struct ApiError(ShutterflowError);

impl From<ShutterflowError> for ApiError {
    fn from(err: ShutterflowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ShutterflowError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            ShutterflowError::UnknownStep { .. }
            | ShutterflowError::InvalidImageError { .. }
            | ShutterflowError::NoAdjustmentRecognized { .. } => StatusCode::BAD_REQUEST,
            ShutterflowError::SessionAlreadyExists { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints under `/api`, CORS open to
/// any origin and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/status/:id", get(handle_status))
        .route("/refine", post(handle_refine))
        .route("/capture/:id", post(handle_capture))
        .route("/sessions/:id/steps/:step", post(handle_step))
        .route("/photo/:id", get(handle_photo))
        .route("/session/:id", delete(handle_delete))
        .route("/sessions", get(handle_sessions))
        .route("/workflow", get(handle_workflow))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/upload`.
async fn handle_upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Json<UploadResponse>> {
    let name = query.filename.as_deref().unwrap_or("upload.jpg");
    info!(bytes = body.len(), name = %name, "Received upload");

    let session = state.engine.upload_photo(&body, name).await?;

    Ok(Json(UploadResponse {
        session_id: session.session_id,
        current_step: session.current_step,
        error_message: session.error_message,
    }))
}

/// Handler for `GET /api/status/:id`.
async fn handle_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionState>> {
    Ok(Json(state.engine.session(&session_id).await?))
}

/// Handler for `POST /api/refine`.
///
/// An unrecognized instruction is reported on the returned session, not as
/// an HTTP error.
async fn handle_refine(
    State(state): State<AppState>,
    Json(request): Json<RefineRequest>,
) -> ApiResult<Json<SessionState>> {
    info!(session_id = %request.session_id, "Received refinement");
    let session = state
        .engine
        .apply_refinement(&request.session_id, &request.user_input)
        .await?;
    Ok(Json(session))
}

/// Handler for `POST /api/capture/:id`.
async fn handle_capture(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionState>> {
    Ok(Json(state.engine.capture_photo(&session_id).await?))
}

/// Handler for `POST /api/sessions/:id/steps/:step`.
async fn handle_step(
    State(state): State<AppState>,
    Path((session_id, step)): Path<(String, String)>,
) -> ApiResult<Json<SessionState>> {
    Ok(Json(state.engine.run_named_step(&session_id, &step).await?))
}

/// Handler for `GET /api/photo/:id`.
async fn handle_photo(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let session = state.engine.session(&session_id).await?;
    let Some(path) = session.captured_photo_path else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session '{session_id}' has no captured photo yet"),
            }),
        )
            .into_response());
    };

    let bytes = tokio::fs::read(&path).await.map_err(ShutterflowError::from)?;
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Handler for `DELETE /api/session/:id`.
async fn handle_delete(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let files_removed = state.engine.end_session(&session_id).await?;
    Ok(Json(DeleteResponse {
        deleted: true,
        files_removed,
    }))
}

/// Handler for `GET /api/sessions`.
async fn handle_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.engine.list_sessions().await,
    })
}

/// Handler for `GET /api/workflow`.
async fn handle_workflow(State(state): State<AppState>) -> Json<Value> {
    Json(state.engine.workflow_description())
}

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        active_sessions: state.engine.session_count().await,
    })
}

// ============================================================================
// Tests
// ============================================================================
