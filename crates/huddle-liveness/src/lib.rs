//! Heartbeat-driven liveness for Huddle.
//!
//! The transport layer delivers heartbeats; this crate decides what
//! silence means. It has three pieces:
//!
//! - [`LivenessConfig`]: thresholds (missed heartbeats, departure grace)
//!   and the sweep cadence.
//! - [`HeartbeatRecord`] + [`LivenessPolicy`]: per-participant evidence
//!   and the pure rule that turns elapsed time into a [`Verdict`].
//! - [`SweepScheduler`]: a timer that fires periodic sweeps, with start
//!   jitter and pause/resume.
//!
//! Only two transitions are ever driven by time: Active → Suspected and
//! Suspected → Departed. Recovery (Suspected → Active) needs an explicit
//! signal, such as a heartbeat or a transport reconnect.
//!
//! # Integration
//!
//! The scheduler sits inside a driver task's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = cancel.cancelled() => break,
//!         sweep = scheduler.wait_for_sweep() => {
//!             room.sweep_liveness(sweep.at).await;
//!         }
//!     }
//! }
//! ```
//!
//! All instants are `tokio::time::Instant` so tests can pause the clock.

mod config;
mod policy;
mod scheduler;

pub use config::LivenessConfig;
pub use policy::{HeartbeatRecord, LivenessPolicy, Verdict};
pub use scheduler::{SweepInfo, SweepScheduler};
