//! Liveness thresholds and sweep cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for liveness tracking.
///
/// A participant is suspected after `missed_heartbeats` consecutive
/// heartbeat intervals of silence, and departs once it has stayed
/// suspected for `departure_grace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// How often the transport is expected to deliver a heartbeat.
    pub heartbeat_interval: Duration,

    /// Consecutive missed heartbeats before Active → Suspected.
    pub missed_heartbeats: u32,

    /// How long a participant may stay Suspected before it departs.
    pub departure_grace: Duration,

    /// How often the sweep runs. Zero disables the periodic sweep; the
    /// owner of the room must then sweep manually.
    pub sweep_interval: Duration,

    /// Random jitter (0–max ms) added to the first sweep so rooms created
    /// together don't all sweep on the same instant.
    pub initial_jitter_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            missed_heartbeats: 3,
            departure_grace: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            initial_jitter_ms: 250,
        }
    }
}

impl LivenessConfig {
    /// Heartbeat interval used when a zero interval is configured.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

    /// Fix any out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - a zero `heartbeat_interval` falls back to the default;
    /// - `missed_heartbeats` is at least 1.
    pub fn validated(mut self) -> Self {
        if self.heartbeat_interval.is_zero() {
            warn!(
                default_ms = u64::try_from(Self::DEFAULT_HEARTBEAT_INTERVAL.as_millis())
                    .unwrap_or(u64::MAX),
                "heartbeat_interval is zero, using default"
            );
            self.heartbeat_interval = Self::DEFAULT_HEARTBEAT_INTERVAL;
        }
        if self.missed_heartbeats == 0 {
            warn!("missed_heartbeats is zero, clamping to 1");
            self.missed_heartbeats = 1;
        }
        self
    }

    /// Silence after which an Active participant becomes Suspected.
    pub fn suspect_after(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.missed_heartbeats)
    }

    /// Sweep period, or `None` when periodic sweeps are disabled.
    pub fn sweep_period(&self) -> Option<Duration> {
        (!self.sweep_interval.is_zero()).then_some(self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_suspects_after_three_intervals() {
        let cfg = LivenessConfig::default();
        assert_eq!(cfg.suspect_after(), Duration::from_secs(15));
        assert_eq!(cfg.sweep_period(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let cfg = LivenessConfig {
            heartbeat_interval: Duration::ZERO,
            missed_heartbeats: 0,
            ..LivenessConfig::default()
        }
        .validated();
        assert_eq!(
            cfg.heartbeat_interval,
            LivenessConfig::DEFAULT_HEARTBEAT_INTERVAL
        );
        assert_eq!(cfg.missed_heartbeats, 1);
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweeps() {
        let cfg = LivenessConfig {
            sweep_interval: Duration::ZERO,
            ..LivenessConfig::default()
        };
        assert_eq!(cfg.sweep_period(), None);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg: LivenessConfig =
            serde_json::from_str(r#"{ "missed_heartbeats": 5 }"#).unwrap();
        assert_eq!(cfg.missed_heartbeats, 5);
        assert_eq!(cfg.departure_grace, Duration::from_secs(30));
    }
}
