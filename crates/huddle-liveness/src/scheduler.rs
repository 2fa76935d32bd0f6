//! Periodic sweep timer.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::LivenessConfig;

/// Information about a fired sweep, returned by
/// [`SweepScheduler::wait_for_sweep`].
#[derive(Debug, Clone)]
pub struct SweepInfo {
    /// Monotonically increasing sweep number (starts at 1).
    pub sweep: u64,
    /// The instant the sweep fired; pass it to the registry as `now`.
    pub at: Instant,
    /// How many whole periods were skipped because the caller was late.
    pub periods_skipped: u64,
}

/// Fires liveness sweeps at a fixed period.
///
/// One scheduler per room. When the period is disabled (zero interval)
/// or the scheduler is paused, [`wait_for_sweep`](Self::wait_for_sweep)
/// pends forever, which is what a `tokio::select!` loop wants.
pub struct SweepScheduler {
    period: Option<Duration>,
    next_sweep: Option<Instant>,
    sweep_count: u64,
    paused: bool,
}

impl SweepScheduler {
    /// Creates a scheduler from config.
    ///
    /// The first sweep is delayed by a random jitter so rooms created
    /// together don't sweep in lock-step.
    pub fn new(config: &LivenessConfig) -> Self {
        let period = config.sweep_period();
        let next_sweep = period.map(|p| {
            let jitter = if config.initial_jitter_ms > 0 {
                let ms = rand::rng().random_range(0..config.initial_jitter_ms);
                Duration::from_millis(ms)
            } else {
                Duration::ZERO
            };
            Instant::now() + p + jitter
        });

        match period {
            Some(p) => debug!(period_ms = millis(p), "sweep scheduler created"),
            None => debug!("sweep scheduler created with periodic sweeps disabled"),
        }

        Self {
            period,
            next_sweep,
            sweep_count: 0,
            paused: false,
        }
    }

    /// Waits until the next sweep is due.
    pub async fn wait_for_sweep(&mut self) -> SweepInfo {
        let (next, period) = match (self.next_sweep, self.period) {
            (Some(next), Some(period)) if !self.paused => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.sweep_count += 1;

        // Always schedule from now so a slow caller doesn't cause a burst.
        let late_by = now.saturating_duration_since(next);
        let periods_skipped =
            u64::try_from(late_by.as_nanos() / period.as_nanos().max(1)).unwrap_or(u64::MAX);
        if periods_skipped > 0 {
            warn!(
                sweep = self.sweep_count,
                skipped = periods_skipped,
                late_ms = millis(late_by),
                "liveness sweep running late"
            );
        }
        self.next_sweep = Some(now + period);

        trace!(sweep = self.sweep_count, "liveness sweep fired");

        SweepInfo {
            sweep: self.sweep_count,
            at: now,
            periods_skipped,
        }
    }

    /// Stops firing sweeps until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(sweep = self.sweep_count, "sweep scheduler paused");
        }
    }

    /// Resumes after a pause; the next sweep is one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(period) = self.period {
                self.next_sweep = Some(Instant::now() + period);
            }
            debug!(sweep = self.sweep_count, "sweep scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether periodic sweeps are disabled.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

/// Whole milliseconds for log fields, saturating.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
