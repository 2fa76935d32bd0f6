//! The join coordinator: at most one in-flight attempt per participant.
//!
//! Every participant has at most one entry in the attempt table:
//!
//! ```text
//!   join() ──→ [Pending] ──(establish ok)──→ [Succeeded] (kept, handle reused)
//!                  │
//!                  ├──(establish err)──→ [Failed]    (removed, error shared)
//!                  └──(last awaiter gone / forget / teardown)──→ [Cancelled] (removed)
//! ```
//!
//! The establishment itself runs in its own Tokio task, so no caller's
//! future is load-bearing: a caller that cancels only detaches itself.
//! The attempt is abandoned when the last attached caller detaches while
//! it is still Pending.
//!
//! # Concurrency note
//!
//! The table sits behind a `parking_lot::Mutex` that is only held for
//! bookkeeping, never across an `.await`. Callers wait on a per-attempt
//! `watch` channel instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use huddle_types::{MembershipId, ParticipantId, RoomId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{EstablishError, SessionError, SessionEstablisher, SessionHandle};

// ---------------------------------------------------------------------------
// Attempt state
// ---------------------------------------------------------------------------

/// Lifecycle state of a session join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAttemptState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// An attempt's state together with its result, as broadcast to awaiters.
enum Outcome<H> {
    Pending,
    Succeeded(SessionHandle<H>),
    Failed(EstablishError),
    Cancelled,
}

impl<H> Outcome<H> {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    fn state(&self) -> JoinAttemptState {
        match self {
            Self::Pending => JoinAttemptState::Pending,
            Self::Succeeded(_) => JoinAttemptState::Succeeded,
            Self::Failed(_) => JoinAttemptState::Failed,
            Self::Cancelled => JoinAttemptState::Cancelled,
        }
    }
}

impl<H> Clone for Outcome<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending => Self::Pending,
            Self::Succeeded(h) => Self::Succeeded(h.clone()),
            Self::Failed(e) => Self::Failed(e.clone()),
            Self::Cancelled => Self::Cancelled,
        }
    }
}

/// One row of the attempt table.
struct Attempt<H> {
    id: u64,
    membership: MembershipId,
    outcome: watch::Sender<Outcome<H>>,
    /// Callers currently waiting on this attempt.
    awaiters: usize,
    /// Establishment task; `None` once it has reported.
    task: Option<AbortHandle>,
}

impl<H> Attempt<H> {
    /// Stops the establishment and tells any remaining receiver the attempt
    /// was cancelled. A settled outcome is left untouched.
    fn abandon(self) {
        if let Some(task) = self.task {
            task.abort();
        }
        let pending = self.outcome.borrow().is_pending();
        if pending {
            self.outcome.send_replace(Outcome::Cancelled);
        }
    }
}

/// What a caller gets when it attaches to the table.
enum Attach<H> {
    /// A live handle for this membership already exists.
    Ready(SessionHandle<H>),
    /// Wait on this attempt.
    Waiting {
        outcome: watch::Receiver<Outcome<H>>,
        attempt_id: u64,
    },
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Shared<E: SessionEstablisher> {
    room_id: RoomId,
    establisher: E,
    attempts: Mutex<HashMap<ParticipantId, Attempt<E::Handle>>>,
    next_attempt: AtomicU64,
    shut_down: AtomicBool,
}

/// Drives the transition from room participant to session handle.
///
/// Cheap to clone; clones share the same attempt table. One coordinator
/// per room.
pub struct SessionJoinCoordinator<E: SessionEstablisher> {
    shared: Arc<Shared<E>>,
}

impl<E: SessionEstablisher> Clone for SessionJoinCoordinator<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: SessionEstablisher> SessionJoinCoordinator<E> {
    /// Creates a coordinator for `room_id` backed by `establisher`.
    pub fn new(room_id: RoomId, establisher: E) -> Self {
        Self {
            shared: Arc::new(Shared {
                room_id,
                establisher,
                attempts: Mutex::new(HashMap::new()),
                next_attempt: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.shared.room_id
    }

    /// Joins `participant_id`'s session for the given membership.
    ///
    /// Membership checks are the caller's job (the room does them); this
    /// only coordinates attempts:
    ///
    /// - a Succeeded attempt for the same membership returns its handle
    ///   without calling the establisher again;
    /// - a Pending attempt is awaited, not duplicated;
    /// - otherwise a new attempt starts and the establisher is invoked once.
    ///
    /// Cancelling `cancel` (or dropping the returned future) detaches only
    /// this caller.
    ///
    /// # Errors
    /// - [`SessionError::JoinFailed`]: the establisher failed
    /// - [`SessionError::Cancelled`]: this caller cancelled, or the
    ///   attempt was abandoned
    pub async fn join(
        &self,
        participant_id: &ParticipantId,
        membership: MembershipId,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle<E::Handle>, SessionError> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled(participant_id.clone()));
        }

        let (mut outcome, attempt_id) =
            match self.attach(participant_id, membership)? {
                Attach::Ready(handle) => return Ok(handle),
                Attach::Waiting {
                    outcome,
                    attempt_id,
                } => (outcome, attempt_id),
            };

        // Detaches this caller however the wait ends, including the future
        // being dropped mid-await.
        let _guard = AwaiterGuard {
            shared: Arc::clone(&self.shared),
            participant_id: participant_id.clone(),
            attempt_id,
        };

        let settled = tokio::select! {
            biased;
            settled = settled(&mut outcome) => settled,
            _ = cancel.cancelled() => {
                debug!(
                    room_id = %self.shared.room_id,
                    %participant_id,
                    attempt_id,
                    "join caller cancelled its wait"
                );
                Outcome::Cancelled
            }
        };

        match settled {
            Outcome::Succeeded(handle) => Ok(handle),
            Outcome::Failed(source) => Err(SessionError::JoinFailed {
                participant_id: participant_id.clone(),
                source,
            }),
            Outcome::Pending | Outcome::Cancelled => {
                Err(SessionError::Cancelled(participant_id.clone()))
            }
        }
    }

    /// Drops whatever attempt `participant_id` has, cancelling it if it is
    /// still Pending. Called when the participant leaves the room.
    pub fn forget(&self, participant_id: &ParticipantId) {
        let removed = self.shared.attempts.lock().remove(participant_id);
        if let Some(attempt) = removed {
            debug!(
                room_id = %self.shared.room_id,
                %participant_id,
                attempt_id = attempt.id,
                "join attempt forgotten"
            );
            attempt.abandon();
        }
    }

    /// Cancels every attempt and refuses new ones. Called on room teardown.
    pub fn cancel_all(&self) {
        self.shared.shut_down.store(true, Ordering::Release);
        let drained: Vec<_> = self.shared.attempts.lock().drain().collect();
        if !drained.is_empty() {
            info!(
                room_id = %self.shared.room_id,
                attempts = drained.len(),
                "cancelling all join attempts"
            );
        }
        for (_, attempt) in drained {
            attempt.abandon();
        }
    }

    /// State of `participant_id`'s current attempt, if any.
    ///
    /// Failed and Cancelled attempts leave the table as soon as they
    /// settle, so this reports `Pending` or `Succeeded` (or `None`).
    pub fn attempt_state(
        &self,
        participant_id: &ParticipantId,
    ) -> Option<JoinAttemptState> {
        self.shared
            .attempts
            .lock()
            .get(participant_id)
            .map(|attempt| attempt.outcome.borrow().state())
    }

    /// Number of callers currently waiting on `participant_id`'s attempt.
    pub fn awaiters(&self, participant_id: &ParticipantId) -> usize {
        self.shared
            .attempts
            .lock()
            .get(participant_id)
            .map_or(0, |attempt| attempt.awaiters)
    }

    /// Registers the caller with an existing attempt or starts a new one.
    fn attach(
        &self,
        participant_id: &ParticipantId,
        membership: MembershipId,
    ) -> Result<Attach<E::Handle>, SessionError> {
        let mut attempts = self.shared.attempts.lock();

        // Checked under the table lock: `cancel_all` raises the flag before
        // it drains, so nothing can be inserted after the drain.
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(SessionError::Cancelled(participant_id.clone()));
        }

        if let Some(attempt) = attempts.get_mut(participant_id) {
            if attempt.membership == membership {
                let current = attempt.outcome.borrow().clone();
                match current {
                    Outcome::Succeeded(handle) => return Ok(Attach::Ready(handle)),
                    Outcome::Pending => {
                        attempt.awaiters += 1;
                        debug!(
                            room_id = %self.shared.room_id,
                            %participant_id,
                            attempt_id = attempt.id,
                            awaiters = attempt.awaiters,
                            "attached to pending join attempt"
                        );
                        return Ok(Attach::Waiting {
                            outcome: attempt.outcome.subscribe(),
                            attempt_id: attempt.id,
                        });
                    }
                    // Settled failures leave the table; nothing to reuse.
                    Outcome::Failed(_) | Outcome::Cancelled => {}
                }
            }
        }

        // Anything left belongs to an earlier membership.
        if let Some(stale) = attempts.remove(participant_id) {
            debug!(
                room_id = %self.shared.room_id,
                %participant_id,
                attempt_id = stale.id,
                "retiring join attempt from an earlier membership"
            );
            stale.abandon();
        }

        let attempt_id = self.shared.next_attempt.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(Outcome::Pending);

        let shared = Arc::clone(&self.shared);
        let pid = participant_id.clone();
        let task = tokio::spawn(async move {
            let result = shared.establisher.establish(shared.room_id, &pid).await;
            shared.settle(&pid, attempt_id, result);
        });

        attempts.insert(
            participant_id.clone(),
            Attempt {
                id: attempt_id,
                membership,
                outcome: tx,
                awaiters: 1,
                task: Some(task.abort_handle()),
            },
        );

        info!(
            room_id = %self.shared.room_id,
            %participant_id,
            %membership,
            attempt_id,
            "session join attempt started"
        );

        Ok(Attach::Waiting {
            outcome: rx,
            attempt_id,
        })
    }
}

impl<E: SessionEstablisher> Shared<E> {
    /// Records the establisher's result for attempt `attempt_id`.
    fn settle(
        &self,
        participant_id: &ParticipantId,
        attempt_id: u64,
        result: Result<E::Handle, EstablishError>,
    ) {
        let mut attempts = self.attempts.lock();
        let Some(attempt) = attempts
            .get_mut(participant_id)
            .filter(|attempt| attempt.id == attempt_id)
        else {
            debug!(
                room_id = %self.room_id,
                %participant_id,
                attempt_id,
                "outcome of a retired join attempt discarded"
            );
            return;
        };
        attempt.task = None;

        match result {
            Ok(session) => {
                let handle = SessionHandle::new(
                    self.room_id,
                    participant_id.clone(),
                    attempt.membership,
                    session,
                );
                info!(
                    room_id = %self.room_id,
                    %participant_id,
                    attempt_id,
                    "session joined"
                );
                attempt.outcome.send_replace(Outcome::Succeeded(handle));
            }
            Err(source) => {
                warn!(
                    room_id = %self.room_id,
                    %participant_id,
                    attempt_id,
                    error = %source,
                    "session join attempt failed"
                );
                attempt.outcome.send_replace(Outcome::Failed(source));
                attempts.remove(participant_id);
            }
        }
    }

    /// Detaches one awaiter; abandons the attempt if it was the last one
    /// and the attempt is still Pending.
    fn release(&self, participant_id: &ParticipantId, attempt_id: u64) {
        let mut attempts = self.attempts.lock();
        let Some(attempt) = attempts
            .get_mut(participant_id)
            .filter(|attempt| attempt.id == attempt_id)
        else {
            return;
        };
        attempt.awaiters = attempt.awaiters.saturating_sub(1);
        let abandon = attempt.awaiters == 0 && attempt.outcome.borrow().is_pending();

        if abandon {
            if let Some(attempt) = attempts.remove(participant_id) {
                debug!(
                    room_id = %self.room_id,
                    %participant_id,
                    attempt_id,
                    "no callers left, join attempt abandoned"
                );
                attempt.abandon();
            }
        }
    }
}

/// Drop guard that detaches a caller from its attempt.
///
/// `Drop` runs whether the wait finished, was cancelled through the token,
/// or the caller's future was dropped.
struct AwaiterGuard<E: SessionEstablisher> {
    shared: Arc<Shared<E>>,
    participant_id: ParticipantId,
    attempt_id: u64,
}

impl<E: SessionEstablisher> Drop for AwaiterGuard<E> {
    fn drop(&mut self) {
        self.shared.release(&self.participant_id, self.attempt_id);
    }
}

/// Waits until the attempt leaves Pending. A closed channel with no
/// settled value means the attempt was dropped: report it as Cancelled.
async fn settled<H>(outcome: &mut watch::Receiver<Outcome<H>>) -> Outcome<H> {
    loop {
        {
            let current = outcome.borrow_and_update();
            if !current.is_pending() {
                return current.clone();
            }
        }
        if outcome.changed().await.is_err() {
            let last = outcome.borrow().clone();
            return if last.is_pending() {
                Outcome::Cancelled
            } else {
                last
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Immediate;

    impl SessionEstablisher for Immediate {
        type Handle = u32;

        async fn establish(
            &self,
            _room_id: RoomId,
            _participant_id: &ParticipantId,
        ) -> Result<u32, EstablishError> {
            Ok(7)
        }
    }

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    #[tokio::test]
    async fn test_join_success_keeps_succeeded_entry() {
        let coordinator = SessionJoinCoordinator::new(RoomId(1), Immediate);
        let cancel = CancellationToken::new();

        let handle = coordinator
            .join(&pid("alice"), MembershipId(1), &cancel)
            .await
            .expect("should join");

        assert_eq!(*handle.session(), 7);
        assert_eq!(handle.room_id(), RoomId(1));
        assert_eq!(
            coordinator.attempt_state(&pid("alice")),
            Some(JoinAttemptState::Succeeded)
        );
        assert_eq!(coordinator.awaiters(&pid("alice")), 0);
    }

    #[tokio::test]
    async fn test_join_with_cancelled_token_never_attaches() {
        let coordinator = SessionJoinCoordinator::new(RoomId(1), Immediate);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = coordinator.join(&pid("alice"), MembershipId(1), &cancel).await;

        assert!(matches!(result, Err(SessionError::Cancelled(_))));
        assert_eq!(coordinator.attempt_state(&pid("alice")), None);
    }

    #[tokio::test]
    async fn test_forget_clears_entry() {
        let coordinator = SessionJoinCoordinator::new(RoomId(1), Immediate);
        let cancel = CancellationToken::new();
        coordinator
            .join(&pid("alice"), MembershipId(1), &cancel)
            .await
            .unwrap();

        coordinator.forget(&pid("alice"));

        assert_eq!(coordinator.attempt_state(&pid("alice")), None);
    }

    #[tokio::test]
    async fn test_cancel_all_refuses_new_attempts() {
        let coordinator = SessionJoinCoordinator::new(RoomId(1), Immediate);
        coordinator.cancel_all();

        let result = coordinator
            .join(&pid("alice"), MembershipId(1), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SessionError::Cancelled(p)) if p == pid("alice")));
    }

    #[test]
    fn test_outcome_state_mapping() {
        assert_eq!(Outcome::<()>::Pending.state(), JoinAttemptState::Pending);
        assert_eq!(Outcome::<()>::Cancelled.state(), JoinAttemptState::Cancelled);
        assert_eq!(
            Outcome::<()>::Failed(EstablishError::new("x")).state(),
            JoinAttemptState::Failed
        );
    }
}
