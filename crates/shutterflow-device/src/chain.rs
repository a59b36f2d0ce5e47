//! Ordered fallback over device transports.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::{DeviceAction, DeviceError, Transport, TransportOutcome};

/// Record of a single tier attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Name of the transport that was tried.
    pub transport: String,
    /// What happened.
    pub outcome: TransportOutcome,
}

impl AttemptRecord {
    /// Creates a new attempt record.
    #[must_use]
    pub fn new(transport: impl Into<String>, outcome: TransportOutcome) -> Self {
        Self {
            transport: transport.into(),
            outcome,
        }
    }
}

/// Successful result of running a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSuccess {
    /// Name of the transport that carried out the action.
    pub transport: String,
    /// Local path of the captured photo, for capture actions.
    pub photo_path: Option<PathBuf>,
    /// Every attempt made, including the successful one.
    pub attempts: Vec<AttemptRecord>,
}

/// Ordered list of transports tried one after another until one succeeds.
///
/// Each attempt runs under its own time box; an attempt that exceeds it is
/// abandoned and recorded as failed.
///
/// ```no_run
/// use std::time::Duration;
/// use shutterflow_device::{DeviceAction, FallbackChain, SimulatedTransport, UrlSchemeHook};
///
/// # async fn example() -> Result<(), shutterflow_device::DeviceError> {
/// let chain = FallbackChain::new(Duration::from_secs(10))
///     .with_transport(UrlSchemeHook::new("CameraControl"))
///     .with_transport(SimulatedTransport::new(Duration::from_millis(10), "/tmp/captures"));
///
/// let success = chain.execute(&DeviceAction::capture_now()).await?;
/// println!("captured via {}", success.transport);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FallbackChain {
    tiers: Vec<Arc<dyn Transport>>,
    attempt_timeout: Duration,
}

impl FallbackChain {
    /// Creates an empty chain whose attempts are each bounded by `attempt_timeout`.
    #[must_use]
    pub const fn new(attempt_timeout: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            attempt_timeout,
        }
    }

    /// Appends a transport as the next tier.
    #[must_use]
    pub fn with_transport(self, transport: impl Transport + 'static) -> Self {
        self.with_shared_transport(Arc::new(transport))
    }

    /// Appends an already shared transport as the next tier.
    #[must_use]
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.tiers.push(transport);
        self
    }

    /// Returns the per-attempt time box.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Returns the transport names in tier order.
    #[must_use]
    pub fn transport_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    /// Returns the number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Returns `true` if the chain has no tiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Runs the action through the tiers in order.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::AllTransportsFailed`] if no tier succeeded.
    #[instrument(skip(self, action), fields(action = action.name()))]
    pub async fn execute(&self, action: &DeviceAction) -> Result<ChainSuccess, DeviceError> {
        let mut attempts = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            let name = tier.name().to_string();
            let outcome = match tokio::time::timeout(self.attempt_timeout, tier.attempt(action))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => TransportOutcome::failed(format!(
                    "timed out after {}ms",
                    self.attempt_timeout.as_millis()
                )),
            };

            match &outcome {
                TransportOutcome::Succeeded { photo_path } => {
                    info!(transport = %name, "Device action succeeded");
                    let photo_path = photo_path.clone();
                    attempts.push(AttemptRecord::new(&name, outcome));
                    return Ok(ChainSuccess {
                        transport: name,
                        photo_path,
                        attempts,
                    });
                }
                TransportOutcome::Unavailable { reason } => {
                    debug!(transport = %name, reason = %reason, "Transport unavailable, falling back");
                }
                TransportOutcome::Failed { reason } => {
                    warn!(transport = %name, reason = %reason, "Transport failed, falling back");
                }
            }
            attempts.push(AttemptRecord::new(name, outcome));
        }

        Err(DeviceError::all_failed(action.name(), attempts))
    }
}
