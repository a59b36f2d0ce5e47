//! The session-addressed workflow engine.
//!
//! [`WorkflowEngine::execute_step`] runs one step against a working copy of a
//! session and returns the result. The session-addressed operations
//! ([`WorkflowEngine::run_step`], [`WorkflowEngine::apply_refinement`], ...)
//! hold the session's lock for the whole step and commit the working copy in
//! a single assignment, so at most one step is in flight per session and an
//! abandoned future never leaves a half-written session behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::actuator::{supported_parameters, DeviceActuator};
use crate::analysis::FeatureExtractor;
use crate::config::{Config, SessionConfig};
use crate::error::{Result, ShutterflowError};
use crate::files::{FileStore, LocalFileStore};
use crate::model::RefinementRecord;
use crate::refinement::RefinementInterpreter;
use crate::session::{SessionState, Step, WorkflowStage};
use crate::store::{InMemorySessionStore, SessionHandle, SessionStore};

// ============================================================================
// Step routing
// ============================================================================

/// What a successful step did to the session's stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The session moved to a new stage.
    Advanced(WorkflowStage),
    /// The step had nothing to do at the current stage.
    Unchanged,
}

/// Stage a session is left at when `step` fails.
const fn failure_stage(step: Step, current: WorkflowStage) -> WorkflowStage {
    match step {
        Step::Upload => WorkflowStage::Upload,
        Step::Analyze => WorkflowStage::Analyze,
        Step::Refine => current,
        Step::Control => WorkflowStage::CaptureReady,
        Step::Capture => WorkflowStage::Capture,
    }
}

/// Decides where a session goes once its parameters are settled.
///
/// Returns `None` when the workflow is finished.
///
/// # Examples
///
/// ```
/// use shutterflow_engine::{route_after_refine, Step, WorkflowStage};
///
/// assert_eq!(route_after_refine(WorkflowStage::CaptureReady), Some(Step::Control));
/// assert_eq!(route_after_refine(WorkflowStage::Capture), Some(Step::Capture));
/// assert_eq!(route_after_refine(WorkflowStage::Completed), None);
/// ```
#[must_use]
pub const fn route_after_refine(stage: WorkflowStage) -> Option<Step> {
    match stage {
        WorkflowStage::CaptureReady => Some(Step::Control),
        WorkflowStage::Completed => None,
        _ => Some(Step::Capture),
    }
}

/// The step a full run executes next from `stage`.
const fn next_step(stage: WorkflowStage) -> Option<Step> {
    match stage {
        WorkflowStage::Upload => Some(Step::Upload),
        WorkflowStage::Analyze => Some(Step::Analyze),
        WorkflowStage::ReadyForRefinement => Some(Step::Refine),
        other => route_after_refine(other),
    }
}

/// Names of every step, in workflow order.
#[must_use]
pub fn supported_steps() -> Vec<&'static str> {
    Step::ALL.iter().map(Step::as_str).collect()
}

// ============================================================================
// SessionSummary
// ============================================================================

/// Short view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Current workflow stage.
    pub current_step: WorkflowStage,
    /// Whether the last step failed.
    pub has_error: bool,
    /// Whether a photo has been captured.
    pub has_photo: bool,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            current_step: state.current_step,
            has_error: state.has_error(),
            has_photo: state.has_photo(),
        }
    }
}

// ============================================================================
// WorkflowEngine
// ============================================================================

/// Sequences upload, analysis, refinement, control and capture per session.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn SessionStore>,
    files: Arc<dyn FileStore>,
    actuator: DeviceActuator,
    extractor: FeatureExtractor,
    interpreter: RefinementInterpreter,
    sessions: SessionConfig,
}

impl WorkflowEngine {
    /// Creates an engine with an in-memory session store and default
    /// refinement and session policies.
    #[must_use]
    pub fn new(actuator: DeviceActuator, files: Arc<dyn FileStore>) -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            files,
            actuator,
            extractor: FeatureExtractor::new(),
            interpreter: RefinementInterpreter::default(),
            sessions: SessionConfig::default(),
        }
    }

    /// Builds an engine from configuration: local file storage, the
    /// configured device chains and refinement step sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if a device endpoint is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let actuator = DeviceActuator::from_config(config)?;
        let files = Arc::new(LocalFileStore::new(&config.upload_dir, &config.capture_dir));
        Ok(Self::new(actuator, files)
            .with_interpreter(RefinementInterpreter::new(config.refinement))
            .with_session_config(config.sessions))
    }

    /// Replaces the session store.
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the refinement interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: RefinementInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Replaces the session retention policy.
    #[must_use]
    pub fn with_session_config(mut self, sessions: SessionConfig) -> Self {
        self.sessions = sessions;
        self
    }

    /// Returns the session retention policy.
    #[must_use]
    pub const fn session_config(&self) -> &SessionConfig {
        &self.sessions
    }

    // ------------------------------------------------------------------------
    // Single-step execution
    // ------------------------------------------------------------------------

    /// Runs exactly `step` against a copy of `state` and returns the copy.
    ///
    /// Failures are recorded on the returned session's `error_message`; a
    /// step that moves the session forward clears it.
    pub async fn execute_step(&self, state: &SessionState, step: Step) -> SessionState {
        let mut next = state.clone();
        let result = match step {
            Step::Upload => self.upload(&next).await,
            Step::Analyze => self.analyze(&mut next).await,
            Step::Refine => Ok(Self::refine(&next)),
            Step::Control => self.control(&next).await,
            Step::Capture => self.capture(&mut next).await,
        };
        Self::settle(&mut next, step, result);
        next
    }

    /// Interprets `text` against a copy of `state` and returns the copy.
    ///
    /// On success the delta is recorded and the session lands at
    /// `CaptureReady`, including from `Completed`. On failure the error is
    /// recorded and the stage is left alone.
    pub fn execute_refinement(&self, state: &SessionState, text: &str) -> SessionState {
        let mut next = state.clone();
        match self
            .interpreter
            .interpret(text, state.current_parameters.as_ref())
        {
            Ok(refinement) => {
                debug!(
                    session_id = %next.session_id,
                    fields = ?refinement.delta.field_names(),
                    "Refinement applied"
                );
                next.current_parameters = Some(refinement.parameters);
                next.add_refinement(RefinementRecord::new(text, refinement.delta));
                next.current_step = WorkflowStage::CaptureReady;
                next.clear_error();
            }
            Err(e) => {
                warn!(session_id = %next.session_id, error = %e, "Refinement not applied");
                next.fail(e.to_string());
            }
        }
        next.touch();
        next
    }

    fn settle(state: &mut SessionState, step: Step, result: Result<Outcome>) {
        match result {
            Ok(Outcome::Advanced(stage)) => {
                debug!(
                    session_id = %state.session_id,
                    step = %step,
                    from = %state.current_step,
                    to = %stage,
                    "Step advanced session"
                );
                state.current_step = stage;
                state.clear_error();
            }
            Ok(Outcome::Unchanged) => {
                debug!(session_id = %state.session_id, step = %step, "Step left stage unchanged");
            }
            Err(e) => {
                warn!(session_id = %state.session_id, step = %step, error = %e, "Step failed");
                state.current_step = failure_stage(step, state.current_step);
                state.fail(e.to_string());
            }
        }
        state.touch();
    }

    async fn upload(&self, state: &SessionState) -> Result<Outcome> {
        if !self.files.exists(&state.reference_photo_path).await {
            return Err(ShutterflowError::invalid_image(format!(
                "reference photo not found at {}",
                state.reference_photo_path.display()
            )));
        }
        Ok(match state.current_step {
            WorkflowStage::Upload => Outcome::Advanced(WorkflowStage::Analyze),
            _ => Outcome::Unchanged,
        })
    }

    async fn analyze(&self, state: &mut SessionState) -> Result<Outcome> {
        if state.analysis.is_none() {
            let extractor = self.extractor;
            let path = state.reference_photo_path.clone();
            let recommendation = tokio::task::spawn_blocking(move || extractor.analyze_file(&path))
                .await
                .map_err(|e| {
                    ShutterflowError::image_decode(
                        &state.reference_photo_path,
                        format!("analysis task failed: {e}"),
                    )
                })??;

            info!(
                session_id = %state.session_id,
                scene = %recommendation.analysis.scene_type,
                "Reference photo analyzed"
            );
            state.analysis = Some(recommendation.analysis);
            state.current_parameters = Some(recommendation.parameters);
            return Ok(Outcome::Advanced(WorkflowStage::ReadyForRefinement));
        }

        Ok(match state.current_step {
            WorkflowStage::Upload | WorkflowStage::Analyze => {
                Outcome::Advanced(WorkflowStage::ReadyForRefinement)
            }
            _ => Outcome::Unchanged,
        })
    }

    const fn refine(state: &SessionState) -> Outcome {
        match state.current_step {
            WorkflowStage::ReadyForRefinement => Outcome::Advanced(WorkflowStage::CaptureReady),
            _ => Outcome::Unchanged,
        }
    }

    async fn control(&self, state: &SessionState) -> Result<Outcome> {
        let Some(params) = state.current_parameters.as_ref() else {
            return Err(ShutterflowError::actuation(
                "set_camera_params",
                "no camera parameters to apply; analyze the reference photo first",
            ));
        };
        let success = self.actuator.apply_parameters(params).await?;
        info!(
            session_id = %state.session_id,
            transport = %success.transport,
            "Camera parameters applied"
        );
        Ok(Outcome::Advanced(WorkflowStage::Capture))
    }

    async fn capture(&self, state: &mut SessionState) -> Result<Outcome> {
        let photo = self.actuator.trigger_capture().await?;
        info!(session_id = %state.session_id, photo = %photo.display(), "Photo captured");
        state.record_capture(photo);
        Ok(Outcome::Advanced(WorkflowStage::Completed))
    }

    // ------------------------------------------------------------------------
    // Session-addressed operations
    // ------------------------------------------------------------------------

    async fn handle(&self, session_id: &str) -> Result<SessionHandle> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| ShutterflowError::session_not_found(session_id))
    }

    /// Creates a session at the `Upload` stage for a photo already on disk.
    ///
    /// A fresh identifier is generated when `session_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionAlreadyExists`] if the identifier
    /// is taken.
    pub async fn create_session(
        &self,
        reference_photo_path: impl Into<PathBuf>,
        session_id: Option<String>,
    ) -> Result<SessionState> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = SessionState::new(session_id, reference_photo_path);
        let snapshot = state.clone();
        self.store.put(state).await?;
        info!(
            session_id = %snapshot.session_id,
            photo = %snapshot.reference_photo_path.display(),
            "Session created"
        );
        Ok(snapshot)
    }

    /// Stores an uploaded photo, opens a session for it and runs the upload
    /// and analyze steps.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::InvalidImageError`] if the bytes are not a
    /// decodable image. Analysis failures are recorded on the session. If no
    /// session ends up owning the stored photo, it is deleted.
    pub async fn upload_photo(&self, bytes: &[u8], suggested_name: &str) -> Result<SessionState> {
        let path = self.files.save(bytes, suggested_name).await?;
        let session = match self.create_session(path.clone(), None).await {
            Ok(session) => session,
            Err(e) => {
                self.discard_upload(&path).await;
                return Err(e);
            }
        };

        let result = match self.run_step(&session.session_id, Step::Upload).await {
            Ok(_) => self.run_step(&session.session_id, Step::Analyze).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.store.delete(&session.session_id).await;
            self.discard_upload(&path).await;
        }
        result
    }

    async fn discard_upload(&self, path: &Path) {
        if let Err(e) = self.files.delete(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove orphaned upload");
        }
    }

    /// Runs one step against a stored session and commits the result.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    #[instrument(skip(self))]
    pub async fn run_step(&self, session_id: &str, step: Step) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let mut guard = handle.lock().await;
        let next = self.execute_step(&guard, step).await;
        *guard = next;
        Ok(guard.clone())
    }

    /// Runs a step given by name.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::UnknownStep`] for an unknown name and
    /// [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn run_named_step(&self, session_id: &str, step_name: &str) -> Result<SessionState> {
        let step: Step = step_name.parse()?;
        self.run_step(session_id, step).await
    }

    /// Applies free-text feedback to a stored session.
    ///
    /// An unrecognized instruction is recorded as the session's error, not
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn apply_refinement(&self, session_id: &str, text: &str) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let mut guard = handle.lock().await;
        let next = self.execute_refinement(&guard, text);
        *guard = next;
        Ok(guard.clone())
    }

    /// Drives a session forward until it completes, a step fails, or a step
    /// makes no progress.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn run_full_workflow(&self, session_id: &str) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let mut guard = handle.lock().await;

        let mut working = guard.clone();
        for _ in 0..Step::ALL.len() {
            let Some(step) = next_step(working.current_step) else {
                break;
            };
            let before = working.current_step;
            working = self.execute_step(&working, step).await;
            if working.has_error() || working.current_step == before {
                break;
            }
        }

        info!(
            session_id = %working.session_id,
            stage = %working.current_step,
            error = ?working.error_message,
            "Workflow run finished"
        );
        *guard = working;
        Ok(guard.clone())
    }

    /// Pushes the current parameters and captures unless the push failed.
    /// Old captures beyond the retention count are pruned afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn capture_photo(&self, session_id: &str) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let mut guard = handle.lock().await;

        let mut working = self.execute_step(&guard, Step::Control).await;
        if !working.has_error() {
            working = self.execute_step(&working, Step::Capture).await;
        }
        *guard = working;
        let snapshot = guard.clone();
        drop(guard);

        if snapshot.has_photo() {
            if let Err(e) = self
                .files
                .prune_captures(self.sessions.keep_latest_captures)
                .await
            {
                warn!(error = %e, "Capture pruning failed");
            }
        }
        Ok(snapshot)
    }

    /// Returns a snapshot of a session.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn session(&self, session_id: &str) -> Result<SessionState> {
        let handle = self.handle(session_id).await?;
        let state = handle.lock().await.clone();
        Ok(state)
    }

    /// Summaries of every idle session, oldest first.
    ///
    /// Sessions with a step in flight are skipped rather than waited on.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions = Vec::new();
        for handle in self.store.list().await {
            let Ok(state) = handle.try_lock() else {
                debug!("Skipping busy session in listing");
                continue;
            };
            sessions.push((state.created_at, SessionSummary::from(&*state)));
        }
        sessions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.session_id.cmp(&b.1.session_id)));
        sessions.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Number of active sessions.
    pub async fn session_count(&self) -> usize {
        self.store.list().await.len()
    }

    /// Ends a session and deletes every file it owns. Returns the number of
    /// files removed.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::SessionNotFound`] for an unknown session.
    pub async fn end_session(&self, session_id: &str) -> Result<usize> {
        let handle = self
            .store
            .delete(session_id)
            .await
            .ok_or_else(|| ShutterflowError::session_not_found(session_id))?;
        let files = handle.lock().await.owned_files();

        let results = join_all(files.iter().map(|path| self.files.delete(path))).await;
        let mut removed = 0;
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete session file"),
            }
        }

        info!(session_id = %session_id, removed, "Session ended");
        Ok(removed)
    }

    /// Ends sessions idle for longer than `max_age` and sessions stuck at
    /// upload or analyze with an error. Sessions with a step in flight are
    /// skipped. Returns the number of sessions ended.
    pub async fn reap_sessions(&self, max_age: Duration) -> usize {
        let mut expired = Vec::new();
        for handle in self.store.list().await {
            let Ok(state) = handle.try_lock() else {
                continue;
            };
            let idle = state.idle_for().to_std().is_ok_and(|idle| idle > max_age);
            let stuck = state.has_error()
                && matches!(
                    state.current_step,
                    WorkflowStage::Upload | WorkflowStage::Analyze
                );
            if idle || stuck {
                expired.push(state.session_id.clone());
            }
        }

        let mut reaped = 0;
        for session_id in expired {
            if self.end_session(&session_id).await.is_ok() {
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped, "Reaped sessions");
        }
        reaped
    }

    /// Describes the workflow: stages, steps, transitions and what the
    /// configured device chains accept.
    #[must_use]
    pub fn workflow_description(&self) -> Value {
        json!({
            "name": "shutterflow",
            "description": "Reference photo to camera parameters to device control to capture",
            "steps": supported_steps(),
            "stages": [
                WorkflowStage::Upload,
                WorkflowStage::Analyze,
                WorkflowStage::ReadyForRefinement,
                WorkflowStage::CaptureReady,
                WorkflowStage::Control,
                WorkflowStage::Capture,
                WorkflowStage::Completed,
            ],
            "transitions": [
                ["upload", "analyze"],
                ["analyze", "ready_for_refinement"],
                ["ready_for_refinement", "capture_ready"],
                ["capture_ready", "control"],
                ["control", "capture"],
                ["capture", "completed"],
                ["completed", "capture_ready"],
            ],
            "controlTransports": self.actuator.control_transports(),
            "captureTransports": self.actuator.capture_transports(),
            "parameters": supported_parameters(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
