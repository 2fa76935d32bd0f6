//! Background liveness sweeps for a room.

use std::sync::Arc;

use huddle_liveness::SweepScheduler;
use huddle_room::Room;
use huddle_session::SessionEstablisher;
use huddle_transport::PeerLink;
use huddle_types::Liveness;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A Tokio task that sweeps a room's liveness on a fixed period.
///
/// The task stops when its token is cancelled (or the parent token it was
/// spawned with) or when the room closes. Dropping the driver does not
/// stop the task; call [`stop`](Self::stop).
pub struct LivenessDriver {
    cancel: CancellationToken,
    task: JoinHandle<u64>,
}

impl LivenessDriver {
    /// Spawns the sweep loop for `room`. Cancelling `cancel` stops it.
    pub fn spawn<E, L>(room: Arc<Room<E, L>>, cancel: CancellationToken) -> Self
    where
        E: SessionEstablisher,
        L: PeerLink,
    {
        let cancel = cancel.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut scheduler = SweepScheduler::new(room.liveness_config());
            let room_id = room.id();
            info!(%room_id, "liveness driver started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(%room_id, "liveness driver cancelled");
                        break;
                    }
                    sweep = scheduler.wait_for_sweep() => {
                        let transitions = room.sweep_liveness(sweep.at).await;
                        let departed = transitions
                            .iter()
                            .filter(|t| t.to == Liveness::Departed)
                            .count();
                        if !transitions.is_empty() {
                            debug!(
                                %room_id,
                                sweep = sweep.sweep,
                                transitions = transitions.len(),
                                departed,
                                "liveness sweep"
                            );
                        }
                        if room.is_closed() {
                            debug!(%room_id, "room closed, liveness driver exiting");
                            break;
                        }
                    }
                }
            }

            let sweeps = scheduler.sweep_count();
            info!(%room_id, sweeps, "liveness driver stopped");
            sweeps
        });

        Self { cancel, task }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and returns how many sweeps it ran.
    ///
    /// # Errors
    /// The task's [`JoinError`] if it panicked.
    pub async fn stop(self) -> Result<u64, JoinError> {
        self.cancel.cancel();
        self.task.await
    }

    /// Waits for the loop to exit on its own (room closed or token
    /// cancelled elsewhere) and returns how many sweeps it ran.
    ///
    /// # Errors
    /// The task's [`JoinError`] if it panicked.
    pub async fn wait(self) -> Result<u64, JoinError> {
        self.task.await
    }
}
