//! Session state for the Shutterflow workflow.
//!
//! A session tracks one reference photo through analysis, any number of
//! refinement rounds, and the capture of a matching photo.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ShutterflowError;
use crate::model::{CameraParameters, ImageAnalysis, RefinementRecord};

// ============================================================================
// WorkflowStage
// ============================================================================

/// Where a session currently sits in the workflow.
///
/// The stages advance as:
/// - `Upload` -> `Analyze` -> `ReadyForRefinement` -> `CaptureReady`
/// - From `CaptureReady`: `Control` -> `Capture` -> `Completed`
/// - Feedback on a `Completed` session re-enters at `CaptureReady`
///
/// A failed step leaves the session at the stage that failed (or, for
/// `Control`, back at `CaptureReady`) with `error_message` set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Waiting for the reference photo to be confirmed on disk.
    #[default]
    Upload,
    /// Waiting for the photo to be analyzed.
    Analyze,
    /// Analysis done; feedback may be given.
    ReadyForRefinement,
    /// Parameters settled; ready to push them to the camera.
    CaptureReady,
    /// Parameters pushed; ready to capture.
    Control,
    /// Waiting for a capture to succeed.
    Capture,
    /// A photo has been captured.
    Completed,
}

impl WorkflowStage {
    /// Returns `true` for the terminal stage.
    ///
    /// # Examples
    ///
    /// ```
    /// use shutterflow_engine::WorkflowStage;
    ///
    /// assert!(WorkflowStage::Completed.is_terminal());
    /// assert!(!WorkflowStage::CaptureReady.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the snake_case name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Analyze => "analyze",
            Self::ReadyForRefinement => "ready_for_refinement",
            Self::CaptureReady => "capture_ready",
            Self::Control => "control",
            Self::Capture => "capture",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Step
// ============================================================================

/// A unit of work the engine can execute against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Confirm the reference photo exists.
    Upload,
    /// Analyze the reference photo and recommend parameters.
    Analyze,
    /// Settle the parameters (pass-through without feedback).
    Refine,
    /// Push the parameters to the camera.
    Control,
    /// Trigger a capture.
    Capture,
}

impl Step {
    /// Every step, in workflow order.
    pub const ALL: [Self; 5] = [
        Self::Upload,
        Self::Analyze,
        Self::Refine,
        Self::Control,
        Self::Capture,
    ];

    /// Returns the step's name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Analyze => "analyze",
            Self::Refine => "refine",
            Self::Control => "control",
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = ShutterflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == lower)
            .ok_or_else(|| ShutterflowError::unknown_step(s))
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Complete state of one photo session.
///
/// Serialized as-is for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Unique session identifier.
    pub session_id: String,

    /// Path of the uploaded reference photo.
    pub reference_photo_path: PathBuf,

    /// Analysis of the reference photo, once produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ImageAnalysis>,

    /// Accepted feedback, oldest first.
    #[serde(default)]
    pub refinement_history: Vec<RefinementRecord>,

    /// Latest parameter snapshot, once recommended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_parameters: Option<CameraParameters>,

    /// Path of the most recent capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_photo_path: Option<PathBuf>,

    /// Current workflow stage.
    pub current_step: WorkflowStage,

    /// Failure recorded by the last step, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Files to delete when the session ends.
    #[serde(default)]
    pub temp_files: BTreeSet<PathBuf>,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last committed.
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a session at the `Upload` stage for the given reference photo.
    ///
    /// # Examples
    ///
    /// ```
    /// use shutterflow_engine::{SessionState, WorkflowStage};
    ///
    /// let state = SessionState::new("abc", "/tmp/ref.jpg");
    /// assert_eq!(state.current_step, WorkflowStage::Upload);
    /// assert!(state.analysis.is_none());
    /// assert!(state.refinement_history.is_empty());
    /// ```
    #[must_use]
    pub fn new(session_id: impl Into<String>, reference_photo_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            reference_photo_path: reference_photo_path.into(),
            analysis: None,
            refinement_history: Vec::new(),
            current_parameters: None,
            captured_photo_path: None,
            current_step: WorkflowStage::Upload,
            error_message: None,
            temp_files: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the last step recorded an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Returns `true` once a capture has been recorded.
    #[must_use]
    pub const fn has_photo(&self) -> bool {
        self.captured_photo_path.is_some()
    }

    /// Records a step failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clears a previously recorded failure.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Appends a refinement record.
    pub fn add_refinement(&mut self, record: RefinementRecord) {
        self.refinement_history.push(record);
    }

    /// Records a new capture; the previous one, if any, is kept for cleanup.
    pub fn record_capture(&mut self, path: PathBuf) {
        self.temp_files.remove(&path);
        if let Some(previous) = self.captured_photo_path.replace(path) {
            if self.captured_photo_path.as_ref() != Some(&previous) {
                self.temp_files.insert(previous);
            }
        }
    }

    /// Every file this session owns on disk.
    #[must_use]
    pub fn owned_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.reference_photo_path.clone()];
        files.extend(self.captured_photo_path.iter().cloned());
        files.extend(self.temp_files.iter().cloned());
        files
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns how long the session has gone without a commit.
    #[must_use]
    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.updated_at
    }
}

// ============================================================================
// Tests
// ============================================================================
