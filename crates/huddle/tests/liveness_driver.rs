//! Integration tests for the background liveness driver.

use std::sync::Arc;
use std::time::Duration;

use huddle::prelude::*;

struct Noop;

impl SessionEstablisher for Noop {
    type Handle = ();

    async fn establish(
        &self,
        _room_id: RoomId,
        _participant_id: &ParticipantId,
    ) -> Result<(), EstablishError> {
        Ok(())
    }
}

fn fast_config() -> RoomConfig {
    RoomConfig {
        liveness: LivenessConfig {
            heartbeat_interval: Duration::from_millis(100),
            missed_heartbeats: 2,
            departure_grace: Duration::from_millis(300),
            sweep_interval: Duration::from_millis(100),
            initial_jitter_ms: 0,
        },
        ..RoomConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_driver_removes_silent_owner_and_elects() {
    let room = Arc::new(Room::create(RoomId(1), "quiet", Noop, fast_config()));
    room.join("chatty").unwrap();
    let mut events = room.subscribe();
    let driver = LivenessDriver::spawn(Arc::clone(&room), CancellationToken::new());

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        room.record_heartbeat(&ParticipantId::new("chatty"));
    }

    let ids: Vec<_> = room.participants().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![ParticipantId::new("chatty")]);
    assert_eq!(room.owner(), Some(ParticipantId::new("chatty")));
    assert_eq!(room.epoch(), Epoch(1));

    let mut left = false;
    while let Ok(event) = events.try_recv() {
        if event
            == (RoomEvent::ParticipantLeft {
                room_id: RoomId(1),
                participant_id: ParticipantId::new("quiet"),
            })
        {
            left = true;
        }
    }
    assert!(left, "observers should see the departure");

    let sweeps = driver.stop().await.unwrap();
    assert!(sweeps >= 7, "expected a sweep every 100ms, got {sweeps}");
}

#[tokio::test(start_paused = true)]
async fn test_driver_stops_when_parent_token_cancelled() {
    let room = Arc::new(Room::create(RoomId(2), "a", Noop, fast_config()));
    let shutdown = CancellationToken::new();
    let driver = LivenessDriver::spawn(room, shutdown.clone());

    tokio::time::sleep(Duration::from_millis(250)).await;
    shutdown.cancel();

    let sweeps = driver.wait().await.unwrap();
    assert_eq!(sweeps, 2);
}

#[tokio::test(start_paused = true)]
async fn test_driver_exits_after_room_closes() {
    let room = Arc::new(Room::create(RoomId(3), "a", Noop, fast_config()));
    let driver = LivenessDriver::spawn(Arc::clone(&room), CancellationToken::new());

    room.teardown().await;

    let sweeps = tokio::time::timeout(Duration::from_secs(1), driver.wait())
        .await
        .expect("driver should exit on its own")
        .unwrap();
    assert_eq!(sweeps, 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_with_sweeps_disabled_never_sweeps() {
    let config = RoomConfig {
        liveness: LivenessConfig {
            sweep_interval: Duration::ZERO,
            ..fast_config().liveness
        },
        ..fast_config()
    };
    let room = Arc::new(Room::create(RoomId(4), "a", Noop, config));
    let driver = LivenessDriver::spawn(Arc::clone(&room), CancellationToken::new());

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(!driver.is_finished());
    assert_eq!(room.owner(), Some(ParticipantId::new("a")), "nobody swept");
    assert_eq!(driver.stop().await.unwrap(), 0);
}
