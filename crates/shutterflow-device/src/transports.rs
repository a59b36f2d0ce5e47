//! Concrete device transports: HTTP endpoint, URL-scheme hook, simulation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::{capture_file_name, DeviceAction, DeviceError, Transport, TransportOutcome};

/// Response body expected from an HTTP device endpoint.
#[derive(Debug, Deserialize)]
struct DeviceResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    photo_url: Option<String>,
}

// ============================================================================
// HttpTransport
// ============================================================================

/// Primary tier: POSTs the action payload to a device endpoint.
///
/// An attempt succeeds when the endpoint answers `200 OK` with
/// `{"success": true}`. For captures the body must also name a `photo_url`,
/// which is downloaded into the configured download directory.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    download_dir: Option<PathBuf>,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidEndpoint`] if `endpoint` is not an
    /// absolute `http(s)` URL, or [`DeviceError::Client`] if the HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, DeviceError> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint,
            download_dir: None,
        })
    }

    /// Replaces the HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sets the directory captured photos are downloaded into.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Returns the endpoint this transport posts to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, action: &DeviceAction) -> Result<DeviceResponse, String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&action.payload())
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if response.status() != StatusCode::OK {
            return Err(format!("device answered HTTP {}", response.status().as_u16()));
        }

        response
            .json::<DeviceResponse>()
            .await
            .map_err(|e| format!("unreadable device response: {e}"))
    }

    async fn download(&self, photo_url: &str) -> Result<PathBuf, String> {
        let dir = self
            .download_dir
            .as_deref()
            .ok_or_else(|| "no download directory configured".to_string())?;
        let url = self
            .endpoint
            .join(photo_url)
            .map_err(|e| format!("invalid photo_url '{photo_url}': {e}"))?;

        debug!(url = %url, "Downloading captured photo");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("photo download failed: {e}"))?;
        if response.status() != StatusCode::OK {
            return Err(format!(
                "photo download answered HTTP {}",
                response.status().as_u16()
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("photo download interrupted: {e}"))?;

        write_artifact(dir, &bytes)
            .await
            .map_err(|e| format!("failed to store downloaded photo: {e}"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, action), fields(endpoint = %self.endpoint, action = action.name()))]
    async fn attempt(&self, action: &DeviceAction) -> TransportOutcome {
        let response = match self.post(action).await {
            Ok(response) => response,
            Err(reason) => return TransportOutcome::failed(reason),
        };

        if !response.success {
            return TransportOutcome::failed("device reported success=false");
        }

        match action {
            DeviceAction::ApplyParameters { .. } => TransportOutcome::Succeeded { photo_path: None },
            DeviceAction::CapturePhoto { .. } => match response.photo_url {
                None => TransportOutcome::failed("device response carried no photo_url"),
                Some(photo_url) => match self.download(&photo_url).await {
                    Ok(path) => TransportOutcome::Succeeded {
                        photo_path: Some(path),
                    },
                    Err(reason) => TransportOutcome::failed(reason),
                },
            },
        }
    }
}

/// Parses and checks a device endpoint URL.
///
/// # Errors
///
/// Returns [`DeviceError::InvalidEndpoint`] for anything that is not an
/// absolute `http` or `https` URL.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, DeviceError> {
    let url = Url::parse(endpoint).map_err(|e| DeviceError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DeviceError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

// ============================================================================
// UrlSchemeHook
// ============================================================================

/// Secondary tier: an OS automation hook reached through a URL scheme.
///
/// No host integration exists yet, so every attempt reports
/// [`TransportOutcome::Unavailable`].
#[derive(Debug, Clone)]
pub struct UrlSchemeHook {
    shortcut: String,
}

impl UrlSchemeHook {
    /// Creates a hook that would run the named shortcut.
    #[must_use]
    pub fn new(shortcut: impl Into<String>) -> Self {
        Self {
            shortcut: shortcut.into(),
        }
    }

    /// The URL that would be opened to run the shortcut.
    #[must_use]
    pub fn url(&self) -> String {
        format!("shortcuts://run-shortcut?name={}", self.shortcut)
    }
}

#[async_trait]
impl Transport for UrlSchemeHook {
    fn name(&self) -> &str {
        "shortcuts"
    }

    async fn attempt(&self, action: &DeviceAction) -> TransportOutcome {
        debug!(url = %self.url(), action = action.name(), "Trying URL-scheme automation hook");
        TransportOutcome::unavailable("URL-scheme automation is not wired on this host")
    }
}

// ============================================================================
// SimulatedTransport
// ============================================================================

/// Last tier: pretends to be a device so the workflow runs without hardware.
///
/// Every attempt waits `delay` to mimic device latency. Parameter pushes are
/// logged and reported as applied; captures write a placeholder artifact into
/// the capture directory.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    delay: Duration,
    capture_dir: PathBuf,
}

impl SimulatedTransport {
    /// Creates a simulated device.
    #[must_use]
    pub fn new(delay: Duration, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            delay,
            capture_dir: capture_dir.into(),
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn attempt(&self, action: &DeviceAction) -> TransportOutcome {
        tokio::time::sleep(self.delay).await;

        match action {
            DeviceAction::ApplyParameters { params } => {
                let rendered = serde_json::to_string(params).unwrap_or_default();
                info!(params = %rendered, "Simulated device applied parameters");
                TransportOutcome::Succeeded { photo_path: None }
            }
            DeviceAction::CapturePhoto { timestamp } => {
                let placeholder = format!(
                    "# Simulated capture\n# Requested at: {}\n# Written at: {}\n",
                    timestamp.to_rfc3339(),
                    Utc::now().to_rfc3339()
                );
                match write_artifact(&self.capture_dir, placeholder.as_bytes()).await {
                    Ok(path) => {
                        info!(path = %path.display(), "Simulated capture written");
                        TransportOutcome::Succeeded {
                            photo_path: Some(path),
                        }
                    }
                    Err(e) => TransportOutcome::failed(format!(
                        "could not write simulated capture: {e}"
                    )),
                }
            }
        }
    }
}

/// Writes bytes to a fresh capture file inside `dir`, creating `dir` if needed.
async fn write_artifact(dir: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(capture_file_name());
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
