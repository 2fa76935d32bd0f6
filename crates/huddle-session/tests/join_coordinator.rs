//! Integration tests for the session join coordinator.
//!
//! The establisher is gated by a semaphore so tests decide when the
//! "network round-trip" completes. Everything runs on one task, so
//! `yield_now` is enough to let callers attach before the gate opens.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use huddle_session::{
    CancellationToken, EstablishError, JoinAttemptState, SessionError, SessionEstablisher,
    SessionJoinCoordinator,
};
use huddle_types::{MembershipId, ParticipantId, RoomId};
use tokio::sync::Semaphore;

// =========================================================================
// Helpers
// =========================================================================

/// Establisher that blocks until the gate is opened and counts calls.
#[derive(Clone)]
struct Gated {
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    fail: bool,
}

impl Gated {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Opens the gate for good: permits are returned after each use.
    fn open(&self) {
        self.gate.add_permits(1);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionEstablisher for Gated {
    type Handle = String;

    async fn establish(
        &self,
        room_id: RoomId,
        participant_id: &ParticipantId,
    ) -> Result<String, EstablishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| EstablishError::new("gate closed"))?;
        if self.fail {
            return Err(EstablishError::new("refused"));
        }
        Ok(format!("{room_id}/{participant_id}"))
    }
}

fn alice() -> ParticipantId {
    ParticipantId::new("alice")
}

fn coordinator(establisher: &Gated) -> SessionJoinCoordinator<Gated> {
    SessionJoinCoordinator::new(RoomId(9), establisher.clone())
}

/// Yields until `n` callers are attached to `id`'s attempt.
async fn wait_for_awaiters(
    coordinator: &SessionJoinCoordinator<Gated>,
    id: &ParticipantId,
    n: usize,
) {
    while coordinator.awaiters(id) != n {
        tokio::task::yield_now().await;
    }
}

/// Yields until the establisher has been entered `n` times.
async fn wait_for_calls(establisher: &Gated, n: usize) {
    while establisher.calls() < n {
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// Shared attempts
// =========================================================================

#[tokio::test]
async fn test_concurrent_joins_share_one_attempt() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let alice_id = alice();
    let callers = (0..5).map(|_| coordinator.join(&alice_id, MembershipId(1), &cancel));
    let (results, ()) = tokio::join!(join_all(callers), async {
        wait_for_awaiters(&coordinator, &alice(), 5).await;
        est.open();
    });

    let handles: Vec<_> = results
        .into_iter()
        .map(|r| r.expect("every caller should join"))
        .collect();
    assert!(handles.iter().all(|h| h.same_session(&handles[0])));
    assert_eq!(handles[0].session(), "R-9/alice");
    assert_eq!(est.calls(), 1, "establisher must be invoked exactly once");
}

#[tokio::test]
async fn test_join_after_success_reuses_handle() {
    let est = Gated::new();
    est.open();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let first = coordinator.join(&alice(), MembershipId(1), &cancel).await.unwrap();
    let second = coordinator.join(&alice(), MembershipId(1), &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(est.calls(), 1);
    assert_eq!(
        coordinator.attempt_state(&alice()),
        Some(JoinAttemptState::Succeeded)
    );
}

#[tokio::test]
async fn test_new_membership_starts_fresh_attempt() {
    let est = Gated::new();
    est.open();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let old = coordinator.join(&alice(), MembershipId(1), &cancel).await.unwrap();
    let new = coordinator.join(&alice(), MembershipId(2), &cancel).await.unwrap();

    assert_ne!(old, new);
    assert_eq!(new.membership(), MembershipId(2));
    assert_eq!(est.calls(), 2);

    let again = coordinator.join(&alice(), MembershipId(2), &cancel).await.unwrap();
    assert_eq!(again, new);
    assert_eq!(est.calls(), 2);
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn test_cancelling_one_awaiter_leaves_other_unaffected() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let quitter = CancellationToken::new();
    let stayer = CancellationToken::new();

    let alice_id = alice();
    let (quit, stay, ()) = tokio::join!(
        coordinator.join(&alice_id, MembershipId(1), &quitter),
        coordinator.join(&alice_id, MembershipId(1), &stayer),
        async {
            wait_for_awaiters(&coordinator, &alice(), 2).await;
            quitter.cancel();
            wait_for_awaiters(&coordinator, &alice(), 1).await;
            est.open();
        }
    );

    assert!(matches!(quit, Err(SessionError::Cancelled(ref p)) if *p == alice()));
    let handle = stay.expect("remaining awaiter should still join");
    assert_eq!(handle.participant_id(), &alice());
    assert_eq!(est.calls(), 1);
}

#[tokio::test]
async fn test_cancelling_sole_awaiter_abandons_attempt() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let alice_id = alice();
    let (result, ()) = tokio::join!(
        coordinator.join(&alice_id, MembershipId(1), &cancel),
        async {
            wait_for_awaiters(&coordinator, &alice(), 1).await;
            wait_for_calls(&est, 1).await;
            cancel.cancel();
        }
    );

    assert!(matches!(result, Err(SessionError::Cancelled(_))));
    assert_eq!(coordinator.attempt_state(&alice()), None);

    // The abandoned attempt is gone; a later join runs a new one.
    est.open();
    let handle = coordinator
        .join(&alice(), MembershipId(1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handle.session(), "R-9/alice");
    assert_eq!(est.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_caller_future_detaches_it() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        coordinator.join(&alice(), MembershipId(1), &cancel),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(coordinator.awaiters(&alice()), 0);
    assert_eq!(coordinator.attempt_state(&alice()), None);
}

#[tokio::test]
async fn test_forget_cancels_pending_attempt() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let alice_id = alice();
    let (result, ()) = tokio::join!(
        coordinator.join(&alice_id, MembershipId(1), &cancel),
        async {
            wait_for_awaiters(&coordinator, &alice(), 1).await;
            coordinator.forget(&alice());
        }
    );

    assert!(matches!(result, Err(SessionError::Cancelled(_))));
    assert_eq!(coordinator.attempt_state(&alice()), None);
}

#[tokio::test]
async fn test_cancel_all_cancels_and_refuses() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();
    let bob = ParticipantId::new("bob");

    let alice_id = alice();
    let (a, b, ()) = tokio::join!(
        coordinator.join(&alice_id, MembershipId(1), &cancel),
        coordinator.join(&bob, MembershipId(2), &cancel),
        async {
            wait_for_awaiters(&coordinator, &alice(), 1).await;
            wait_for_awaiters(&coordinator, &bob, 1).await;
            wait_for_calls(&est, 2).await;
            coordinator.cancel_all();
        }
    );

    assert!(matches!(a, Err(SessionError::Cancelled(_))));
    assert!(matches!(b, Err(SessionError::Cancelled(_))));

    est.open();
    let late = coordinator.join(&alice(), MembershipId(1), &cancel).await;
    assert!(matches!(late, Err(SessionError::Cancelled(_))));
    assert_eq!(est.calls(), 2, "no establish after teardown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_racing_joins_leaves_nothing_pending() {
    let est = Gated::new();
    let coordinator = coordinator(&est);
    let participants: Vec<ParticipantId> =
        (0..32).map(|i| ParticipantId::new(format!("p{i:02}"))).collect();

    let joins: Vec<_> = participants
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, id)| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                // The gate never opens: a join that slips in after
                // cancel_all would wait forever.
                tokio::time::timeout(
                    Duration::from_secs(5),
                    coordinator.join(&id, MembershipId(i as u64), &cancel),
                )
                .await
            })
        })
        .collect();
    let teardown = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            coordinator.cancel_all();
        })
    };

    teardown.await.unwrap();
    for join in joins {
        let result = join.await.unwrap().expect("join settled after teardown");
        assert!(matches!(result, Err(SessionError::Cancelled(_))));
    }
    for id in &participants {
        assert_eq!(coordinator.attempt_state(id), None);
    }
}

// =========================================================================
// Failure
// =========================================================================

#[tokio::test]
async fn test_failure_is_shared_and_not_retried() {
    let est = Gated::failing();
    let coordinator = coordinator(&est);
    let cancel = CancellationToken::new();

    let alice_id = alice();
    let (first, second, ()) = tokio::join!(
        coordinator.join(&alice_id, MembershipId(1), &cancel),
        coordinator.join(&alice_id, MembershipId(1), &cancel),
        async {
            wait_for_awaiters(&coordinator, &alice(), 2).await;
            est.open();
        }
    );

    for result in [first, second] {
        match result {
            Err(SessionError::JoinFailed {
                participant_id,
                source,
            }) => {
                assert_eq!(participant_id, alice());
                assert_eq!(source.message(), "refused");
            }
            other => panic!("expected JoinFailed, got {other:?}"),
        }
    }
    assert_eq!(est.calls(), 1);
    assert_eq!(coordinator.attempt_state(&alice()), None);

    // Calling again is a new attempt.
    let retry = coordinator.join(&alice(), MembershipId(1), &cancel).await;
    assert!(matches!(retry, Err(SessionError::JoinFailed { .. })));
    assert_eq!(est.calls(), 2);
}
