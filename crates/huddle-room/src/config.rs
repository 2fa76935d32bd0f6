//! Room configuration.

use std::time::Duration;

use huddle_liveness::LivenessConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ConfigError;

/// Configuration for a room instance.
///
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Liveness thresholds and sweep cadence.
    pub liveness: LivenessConfig,

    /// Buffer size of the event broadcast. Observers that fall further
    /// behind than this miss events (they see `RecvError::Lagged`).
    pub event_capacity: usize,

    /// Probe each candidate through the transport before picking an
    /// owner. Unreachable or slow candidates are skipped.
    pub confirm_candidates: bool,

    /// How long a single candidate probe may take.
    pub probe_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
            confirm_candidates: false,
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RoomConfig {
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Parses a JSON config and validates it.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] if the JSON is malformed or a field has the
    /// wrong type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Fix any out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.liveness = self.liveness.validated();
        if self.event_capacity == 0 {
            warn!(
                default = Self::DEFAULT_EVENT_CAPACITY,
                "event_capacity is zero, using default"
            );
            self.event_capacity = Self::DEFAULT_EVENT_CAPACITY;
        }
        if self.probe_timeout.is_zero() {
            warn!(
                default_ms = u64::try_from(Self::DEFAULT_PROBE_TIMEOUT.as_millis())
                    .unwrap_or(u64::MAX),
                "probe_timeout is zero, using default"
            );
            self.probe_timeout = Self::DEFAULT_PROBE_TIMEOUT;
        }
        self
    }
}
