//! Configuration types for the Shutterflow engine.
//!
//! Configuration is read from `shutterflow.json`. Every field has a default,
//! so a missing file or an empty object yields a working setup that stores
//! files under `/tmp/shutterflow` and falls back to the simulated camera.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShutterflowError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "shutterflow.json";

/// Lowest ISO value a camera accepts.
pub const ISO_MIN: u32 = 25;

/// Highest ISO value a camera accepts.
pub const ISO_MAX: u32 = 3200;

/// Default directory for uploaded reference photos.
fn default_upload_dir() -> PathBuf {
    PathBuf::from("/tmp/shutterflow/uploads")
}

/// Default directory for captured photos.
fn default_capture_dir() -> PathBuf {
    PathBuf::from("/tmp/shutterflow/captures")
}

fn default_control_endpoint() -> String {
    "http://localhost:8080/camera-control".to_string()
}

fn default_capture_endpoint() -> String {
    "http://localhost:8080/camera-capture".to_string()
}

/// Default time box for a parameter push, in seconds.
const fn default_control_timeout() -> u64 {
    10
}

/// Default time box for a capture, in seconds.
const fn default_capture_timeout() -> u64 {
    30
}

fn default_control_shortcut() -> String {
    "SmartPhotoControl".to_string()
}

fn default_capture_shortcut() -> String {
    "SmartPhotoCapture".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_control_delay_ms() -> u64 {
    1000
}

const fn default_capture_delay_ms() -> u64 {
    2000
}

const fn default_exposure_step() -> f64 {
    0.5
}

const fn default_iso_raise() -> u32 {
    800
}

const fn default_iso_lower() -> u32 {
    200
}

const fn default_max_age_hours() -> u64 {
    24
}

const fn default_keep_latest_captures() -> usize {
    10
}

/// Main configuration for Shutterflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory uploaded reference photos are stored in.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory captured photos are stored in.
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,

    /// Camera device settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Step sizes used when interpreting feedback.
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Session lifetime settings.
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            capture_dir: default_capture_dir(),
            device: DeviceConfig::default(),
            refinement: RefinementConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `shutterflow.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ShutterflowError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `shutterflow.json` in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ShutterflowError::ConfigParseError` for unreadable files or
    /// invalid JSON, and `ShutterflowError::ConfigValidationError` when the
    /// values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ShutterflowError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ShutterflowError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ShutterflowError::ConfigValidationError` on the first failing check.
    pub fn validate(&self) -> Result<()> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(ShutterflowError::config_validation(
                "uploadDir must not be empty",
                "Provide a writable directory for uploads in your shutterflow.json",
            ));
        }

        if self.capture_dir.as_os_str().is_empty() {
            return Err(ShutterflowError::config_validation(
                "captureDir must not be empty",
                "Provide a writable directory for captures in your shutterflow.json",
            ));
        }

        self.device.validate()?;
        self.refinement.validate()?;

        if self.sessions.max_age_hours == 0 {
            return Err(ShutterflowError::config_validation(
                "sessions.maxAgeHours must be greater than 0",
                "Set sessions.maxAgeHours to at least 1 in your shutterflow.json",
            ));
        }

        Ok(())
    }
}

/// Camera device settings: endpoints, time boxes and the simulated fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// HTTP endpoint accepting parameter pushes.
    #[serde(default = "default_control_endpoint")]
    pub control_endpoint: String,

    /// HTTP endpoint accepting capture triggers.
    #[serde(default = "default_capture_endpoint")]
    pub capture_endpoint: String,

    /// Time box for each parameter-push attempt, in seconds.
    #[serde(default = "default_control_timeout")]
    pub control_timeout_secs: u64,

    /// Time box for each capture attempt, in seconds.
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,

    /// Shortcut name the URL-scheme hook runs for parameter pushes.
    #[serde(default = "default_control_shortcut")]
    pub control_shortcut: String,

    /// Shortcut name the URL-scheme hook runs for captures.
    #[serde(default = "default_capture_shortcut")]
    pub capture_shortcut: String,

    /// Simulated camera used when no real device answers.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            control_endpoint: default_control_endpoint(),
            capture_endpoint: default_capture_endpoint(),
            control_timeout_secs: default_control_timeout(),
            capture_timeout_secs: default_capture_timeout(),
            control_shortcut: default_control_shortcut(),
            capture_shortcut: default_capture_shortcut(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Per-attempt time box for parameter pushes.
    #[must_use]
    pub const fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }

    /// Per-attempt time box for captures.
    #[must_use]
    pub const fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        for (field, endpoint) in [
            ("device.controlEndpoint", &self.control_endpoint),
            ("device.captureEndpoint", &self.capture_endpoint),
        ] {
            if let Err(e) = shutterflow_device::parse_endpoint(endpoint) {
                return Err(ShutterflowError::config_validation(
                    format!("{field} is not a valid URL: {e}"),
                    "Use an absolute http:// or https:// URL",
                ));
            }
        }

        if self.control_timeout_secs == 0 || self.capture_timeout_secs == 0 {
            return Err(ShutterflowError::config_validation(
                "device timeouts must be greater than 0",
                "Set device.controlTimeoutSecs and device.captureTimeoutSecs to at least 1",
            ));
        }

        if self.simulation.enabled {
            if u128::from(self.simulation.control_delay_ms) >= self.control_timeout().as_millis() {
                return Err(ShutterflowError::config_validation(
                    "device.simulation.controlDelayMs must be shorter than the control timeout",
                    "Lower controlDelayMs or raise device.controlTimeoutSecs",
                ));
            }
            if u128::from(self.simulation.capture_delay_ms) >= self.capture_timeout().as_millis() {
                return Err(ShutterflowError::config_validation(
                    "device.simulation.captureDelayMs must be shorter than the capture timeout",
                    "Lower captureDelayMs or raise device.captureTimeoutSecs",
                ));
            }
        }

        Ok(())
    }
}

/// Simulated camera settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Whether the simulated tier is appended to the fallback chain.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Simulated latency of a parameter push, in milliseconds.
    #[serde(default = "default_control_delay_ms")]
    pub control_delay_ms: u64,

    /// Simulated latency of a capture, in milliseconds.
    #[serde(default = "default_capture_delay_ms")]
    pub capture_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            control_delay_ms: default_control_delay_ms(),
            capture_delay_ms: default_capture_delay_ms(),
        }
    }
}

/// Step sizes applied by directional feedback ("brighter", "less noise").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementConfig {
    /// Exposure offset applied per "brighter"/"darker" request, in EV.
    #[serde(default = "default_exposure_step")]
    pub exposure_step: f64,

    /// ISO set when feedback asks for more sensitivity.
    #[serde(default = "default_iso_raise")]
    pub iso_raise: u32,

    /// ISO set when feedback asks for less noise.
    #[serde(default = "default_iso_lower")]
    pub iso_lower: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            exposure_step: default_exposure_step(),
            iso_raise: default_iso_raise(),
            iso_lower: default_iso_lower(),
        }
    }
}

impl RefinementConfig {
    fn validate(&self) -> Result<()> {
        if !(self.exposure_step > 0.0 && self.exposure_step <= 3.0) {
            return Err(ShutterflowError::config_validation(
                format!(
                    "refinement.exposureStep must be in (0, 3], got {}",
                    self.exposure_step
                ),
                "Use a small step such as 0.5",
            ));
        }

        for (field, iso) in [
            ("refinement.isoRaise", self.iso_raise),
            ("refinement.isoLower", self.iso_lower),
        ] {
            if !(ISO_MIN..=ISO_MAX).contains(&iso) {
                return Err(ShutterflowError::config_validation(
                    format!("{field} must be between {ISO_MIN} and {ISO_MAX}, got {iso}"),
                    "Pick an ISO value the camera supports",
                ));
            }
        }

        Ok(())
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Idle sessions older than this are reaped.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Number of most recent capture artifacts kept on disk.
    #[serde(default = "default_keep_latest_captures")]
    pub keep_latest_captures: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            keep_latest_captures: default_keep_latest_captures(),
        }
    }
}

impl SessionConfig {
    /// Maximum idle age as a duration.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3600)
    }
}
