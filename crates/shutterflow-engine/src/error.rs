//! Error types for the Shutterflow engine.
//!
//! Step failures (bad image, unrecognized feedback, device failure) are
//! recorded on the session's `error_message`; the engine only returns these
//! errors directly for lookups, boundary parsing and configuration.

use std::path::PathBuf;

use shutterflow_device::DeviceError;

/// A specialized `Result` type for Shutterflow engine operations.
pub type Result<T> = std::result::Result<T, ShutterflowError>;

/// Errors that can occur while running a photo workflow.
#[derive(Debug, thiserror::Error)]
pub enum ShutterflowError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your shutterflow.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Image Errors
    // ========================================================================
    /// The reference photo could not be read or decoded.
    #[error("Could not decode image '{path}': {message}\n\nSuggestion: Upload a JPEG or PNG photo and retry the analyze step")]
    ImageDecodeError {
        /// Path of the unreadable image.
        path: PathBuf,
        /// Decoder or I/O error description.
        message: String,
    },

    /// Uploaded bytes are not a decodable image.
    #[error("Invalid image file: {message}\n\nSuggestion: Upload a JPEG or PNG photo")]
    InvalidImageError {
        /// Why the upload was rejected.
        message: String,
    },

    // ========================================================================
    // Refinement Errors
    // ========================================================================
    /// Feedback text did not match any adjustment rule.
    #[error("No adjustment recognized in '{text}'\n\nSuggestion: Try more specific descriptions such as 'increase exposure', 'iso 400' or 'blur the background'")]
    NoAdjustmentRecognized {
        /// The feedback text as given.
        text: String,
    },

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Every device transport failed to carry out the action.
    #[error("Device action '{action}' failed: {message}\n\nSuggestion: Check that the camera endpoint is reachable, or enable simulation in shutterflow.json")]
    ActuationError {
        /// Wire name of the device action.
        action: String,
        /// Summary of every transport attempt.
        message: String,
    },

    /// A device transport could not be configured.
    #[error("Device setup failed: {0}")]
    Device(#[from] DeviceError),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No session exists with the given identifier.
    #[error("Session not found: '{session_id}'\n\nSuggestion: Upload a photo to start a new session")]
    SessionNotFound {
        /// The identifier that was looked up.
        session_id: String,
    },

    /// A session with the requested identifier already exists.
    #[error("Session already exists: '{session_id}'")]
    SessionAlreadyExists {
        /// The conflicting identifier.
        session_id: String,
    },

    /// A step name did not match any workflow step.
    #[error("Unknown workflow step: '{name}'\n\nSuggestion: Use one of upload, analyze, refine, control, capture")]
    UnknownStep {
        /// The unrecognized step name.
        name: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShutterflowError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ImageDecodeError`.
    #[must_use]
    pub fn image_decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ImageDecodeError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidImageError`.
    #[must_use]
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImageError {
            message: message.into(),
        }
    }

    /// Creates a new `NoAdjustmentRecognized` error.
    #[must_use]
    pub fn no_adjustment(text: impl Into<String>) -> Self {
        Self::NoAdjustmentRecognized { text: text.into() }
    }

    /// Creates a new `ActuationError`.
    #[must_use]
    pub fn actuation(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActuationError {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `SessionAlreadyExists` error.
    #[must_use]
    pub fn session_exists(session_id: impl Into<String>) -> Self {
        Self::SessionAlreadyExists {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `UnknownStep` error.
    #[must_use]
    pub fn unknown_step(name: impl Into<String>) -> Self {
        Self::UnknownStep { name: name.into() }
    }

    /// Returns `true` if re-running the failed step may succeed without
    /// changing the session.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ActuationError { .. } | Self::Io(_))
    }

    /// Returns `true` if the error stems from caller input rather than the
    /// system, so it can be reported back verbatim.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::ImageDecodeError { .. }
                | Self::InvalidImageError { .. }
                | Self::NoAdjustmentRecognized { .. }
                | Self::SessionNotFound { .. }
                | Self::SessionAlreadyExists { .. }
                | Self::UnknownStep { .. }
        )
    }
}

impl From<image::ImageError> for ShutterflowError {
    fn from(err: image::ImageError) -> Self {
        Self::invalid_image(err.to_string())
    }
}
