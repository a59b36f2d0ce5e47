//! Shutterflow Device Control
//!
//! Camera control transports and the fallback chain that drives them.
//!
//! A [`DeviceAction`] (push camera parameters, trigger a capture) is handed to
//! a [`FallbackChain`], an ordered list of [`Transport`]s. The first transport
//! that reports success wins; a transport that is unavailable, fails, or runs
//! past its time box hands over to the next tier.

mod chain;
mod transports;

pub use chain::{AttemptRecord, ChainSuccess, FallbackChain};
pub use transports::{parse_endpoint, HttpTransport, SimulatedTransport, UrlSchemeHook};

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// File name prefix shared by every capture artifact written to disk.
pub const CAPTURE_FILE_PREFIX: &str = "captured_";

/// Errors that can occur while driving a camera device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Every transport tier declined or failed the action.
    #[error("all transports failed for '{action}': {summary}")]
    AllTransportsFailed {
        /// Wire name of the action that was attempted.
        action: String,
        /// One `transport: reason` entry per attempted tier.
        summary: String,
        /// The individual attempts, in tier order.
        attempts: Vec<AttemptRecord>,
    },

    /// The configured endpoint is not a usable URL.
    #[error("invalid device endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl DeviceError {
    /// Creates an `AllTransportsFailed` error from the recorded attempts.
    #[must_use]
    pub fn all_failed(action: impl Into<String>, attempts: Vec<AttemptRecord>) -> Self {
        let summary = if attempts.is_empty() {
            "no transports configured".to_string()
        } else {
            attempts
                .iter()
                .map(|a| format!("{}: {}", a.transport, a.outcome.describe()))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Self::AllTransportsFailed {
            action: action.into(),
            summary,
            attempts,
        }
    }
}

/// An action the camera device is asked to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    /// Push a set of already-converted camera parameters to the device.
    ApplyParameters {
        /// Device-vocabulary parameters, keyed by field name.
        params: Map<String, Value>,
    },
    /// Trigger a photo capture.
    CapturePhoto {
        /// When the capture was requested.
        timestamp: DateTime<Utc>,
    },
}

impl DeviceAction {
    /// Creates an `ApplyParameters` action.
    #[must_use]
    pub const fn apply_parameters(params: Map<String, Value>) -> Self {
        Self::ApplyParameters { params }
    }

    /// Creates a `CapturePhoto` action stamped with the current time.
    #[must_use]
    pub fn capture_now() -> Self {
        Self::CapturePhoto {
            timestamp: Utc::now(),
        }
    }

    /// Returns the wire name of the action.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ApplyParameters { .. } => "set_camera_params",
            Self::CapturePhoto { .. } => "capture_photo",
        }
    }

    /// Builds the JSON body sent to an HTTP device endpoint.
    ///
    /// ```
    /// use shutterflow_device::DeviceAction;
    ///
    /// let mut params = serde_json::Map::new();
    /// params.insert("iso".to_string(), 800.into());
    /// let body = DeviceAction::apply_parameters(params).payload();
    /// assert_eq!(body["action"], "set_camera_params");
    /// assert_eq!(body["params"]["iso"], 800);
    /// ```
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::ApplyParameters { params } => json!({
                "action": self.name(),
                "params": params,
            }),
            Self::CapturePhoto { timestamp } => json!({
                "action": self.name(),
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }
}

/// Result of one transport attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The device carried out the action.
    Succeeded {
        /// Local path of the captured photo, for capture actions.
        photo_path: Option<PathBuf>,
    },
    /// The transport is not usable here; the chain moves on.
    Unavailable {
        /// Why the transport could not be used.
        reason: String,
    },
    /// The transport was tried and failed; the chain moves on.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl TransportOutcome {
    /// Creates a `Failed` outcome.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Creates an `Unavailable` outcome.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Short human-readable description, used in logs and error summaries.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded { photo_path: None } => "succeeded".to_string(),
            Self::Succeeded {
                photo_path: Some(path),
            } => format!("succeeded ({})", path.display()),
            Self::Unavailable { reason } => format!("unavailable ({reason})"),
            Self::Failed { reason } => format!("failed ({reason})"),
        }
    }
}

/// One mechanism for carrying out a device action.
///
/// Implementations never return an error: anything that prevents the action
/// is reported as [`TransportOutcome::Unavailable`] or
/// [`TransportOutcome::Failed`] so the chain can fall over to the next tier.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and attempt records.
    fn name(&self) -> &str;

    /// Attempts the action once.
    async fn attempt(&self, action: &DeviceAction) -> TransportOutcome;
}

/// Generates a unique file name for a capture artifact.
///
/// Names look like `captured_20260203_100000_1a2b3c4d.jpg`.
#[must_use]
pub fn capture_file_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{CAPTURE_FILE_PREFIX}{}_{}.jpg",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8]
    )
}
