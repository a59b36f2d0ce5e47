//! Camera actuation: parameter push and capture trigger.
//!
//! Domain parameters are translated into the device vocabulary and handed to
//! a [`FallbackChain`]. Each use has its own chain so pushes and captures can
//! carry different time boxes and endpoints.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Map, Value};
use shutterflow_device::{
    ChainSuccess, DeviceAction, DeviceError, FallbackChain, HttpTransport, SimulatedTransport,
    UrlSchemeHook,
};
use tracing::{debug, info, warn};

use crate::config::{Config, ISO_MAX, ISO_MIN};
use crate::error::{Result, ShutterflowError};
use crate::model::{CameraParameters, FocusMode, SceneMode};

/// Exposure range the device accepts, in EV.
const DEVICE_EXPOSURE_RANGE: (f64, f64) = (-2.0, 2.0);

/// Drives the camera through two fallback chains.
#[derive(Debug, Clone)]
pub struct DeviceActuator {
    control: FallbackChain,
    capture: FallbackChain,
}

impl DeviceActuator {
    /// Creates an actuator from explicit chains.
    #[must_use]
    pub const fn new(control: FallbackChain, capture: FallbackChain) -> Self {
        Self { control, capture }
    }

    /// Builds the HTTP → URL-scheme hook → simulated chains from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured endpoint is not a valid URL.
    pub fn from_config(config: &Config) -> Result<Self> {
        let device = &config.device;

        let mut control = FallbackChain::new(device.control_timeout())
            .with_transport(HttpTransport::new(&device.control_endpoint)?)
            .with_transport(UrlSchemeHook::new(&device.control_shortcut));
        let mut capture = FallbackChain::new(device.capture_timeout())
            .with_transport(
                HttpTransport::new(&device.capture_endpoint)?
                    .with_download_dir(&config.capture_dir),
            )
            .with_transport(UrlSchemeHook::new(&device.capture_shortcut));

        if device.simulation.enabled {
            control = control.with_transport(SimulatedTransport::new(
                Duration::from_millis(device.simulation.control_delay_ms),
                &config.capture_dir,
            ));
            capture = capture.with_transport(SimulatedTransport::new(
                Duration::from_millis(device.simulation.capture_delay_ms),
                &config.capture_dir,
            ));
        }

        debug!(
            control = ?control.transport_names(),
            capture = ?capture.transport_names(),
            "Device chains configured"
        );
        Ok(Self::new(control, capture))
    }

    /// Pushes parameters to the camera.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::ActuationError`] if every transport failed.
    pub async fn apply_parameters(&self, params: &CameraParameters) -> Result<ChainSuccess> {
        let device_params = to_device_params(params);
        let shown = Value::Object(device_params.clone());
        info!(params = %shown, "Pushing camera parameters");
        let action = DeviceAction::apply_parameters(device_params);
        self.control.execute(&action).await.map_err(actuation_error)
    }

    /// Triggers a capture and returns the local path of the photo.
    ///
    /// # Errors
    ///
    /// Returns [`ShutterflowError::ActuationError`] if every transport failed
    /// or the winning transport produced no photo.
    pub async fn trigger_capture(&self) -> Result<PathBuf> {
        let action = DeviceAction::capture_now();
        let success = self
            .capture
            .execute(&action)
            .await
            .map_err(actuation_error)?;
        success.photo_path.ok_or_else(|| {
            ShutterflowError::actuation(
                action.name(),
                format!("transport '{}' reported no photo", success.transport),
            )
        })
    }

    /// Transport names of the parameter-push chain, in order.
    #[must_use]
    pub fn control_transports(&self) -> Vec<String> {
        self.control.transport_names()
    }

    /// Transport names of the capture chain, in order.
    #[must_use]
    pub fn capture_transports(&self) -> Vec<String> {
        self.capture.transport_names()
    }
}

fn actuation_error(err: DeviceError) -> ShutterflowError {
    match err {
        DeviceError::AllTransportsFailed {
            action, summary, ..
        } => {
            warn!(action = %action, summary = %summary, "Device action failed on every transport");
            ShutterflowError::actuation(action, summary)
        }
        other => other.into(),
    }
}

/// Value ranges the device accepts, as reported by the workflow description.
#[must_use]
pub fn supported_parameters() -> Value {
    json!({
        "aperture": { "min": 1.6, "max": 5.6, "available": [1.6, 2.0, 2.8, 4.0, 5.6] },
        "exposure": { "min": DEVICE_EXPOSURE_RANGE.0, "max": DEVICE_EXPOSURE_RANGE.1, "step": 0.1 },
        "iso": { "min": ISO_MIN, "max": ISO_MAX, "auto": true },
        "focus": ["AF", "macro", "infinity", "MF"],
        "white_balance": ["auto", "daylight", "cloudy", "fluorescent", "incandescent", "flash"],
        "scene_mode": ["photo", "portrait", "night"],
    })
}

/// Converts domain parameters into the device vocabulary.
///
/// Values that cannot be converted (an aperture that is not a number) are
/// dropped with a warning rather than failing the push. Unset fields are
/// omitted.
#[must_use]
pub fn to_device_params(params: &CameraParameters) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(aperture) = &params.aperture {
        match parse_aperture(aperture) {
            Some(value) => {
                out.insert("aperture".to_string(), json!(value));
            }
            None => warn!(aperture = %aperture, "Dropping unconvertible aperture"),
        }
    }
    if let Some(exposure) = params.exposure_compensation {
        let (min, max) = DEVICE_EXPOSURE_RANGE;
        out.insert("exposure".to_string(), json!(exposure.clamp(min, max)));
    }
    if let Some(iso) = params.iso {
        out.insert("iso".to_string(), json!(iso.clamp(ISO_MIN, ISO_MAX)));
    }
    if let Some(focus) = params.focus_mode {
        let token = match focus {
            FocusMode::Auto => "AF",
            FocusMode::Macro => "macro",
            FocusMode::Infinity => "infinity",
            FocusMode::Manual => "MF",
        };
        out.insert("focus".to_string(), json!(token));
    }
    if let Some(white_balance) = params.white_balance {
        out.insert("white_balance".to_string(), json!(white_balance.as_str()));
    }
    if let Some(scene) = params.scene_mode {
        let token = match scene {
            SceneMode::Portrait => "portrait",
            SceneMode::Night => "night",
            SceneMode::Auto | SceneMode::Landscape | SceneMode::Sport => "photo",
        };
        out.insert("scene_mode".to_string(), json!(token));
    }

    out
}

/// Parses `f/2.8` (or a bare `2.8`) into its f-number.
fn parse_aperture(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    let number = trimmed
        .strip_prefix("f/")
        .or_else(|| trimmed.strip_prefix("F/"))
        .unwrap_or(trimmed);
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}
