use std::sync::Arc;
use std::time::Duration;

use huddle::prelude::*;

// ---------------------------------------------------------------------------
// A pretend session layer
// ---------------------------------------------------------------------------

/// "Connects" a participant to a voice channel after a short delay.
struct VoiceChannels;

impl SessionEstablisher for VoiceChannels {
    type Handle = String;

    async fn establish(
        &self,
        room_id: RoomId,
        participant_id: &ParticipantId,
    ) -> Result<String, EstablishError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!("voice://{room_id}/{participant_id}"))
    }
}

const CONFIG: &str = r#"{
    "event_capacity": 32,
    "confirm_candidates": true,
    "liveness": { "missed_heartbeats": 2 }
}"#;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    huddle::init_tracing();

    let config = RoomConfig::from_json(CONFIG)?;
    let link = LoopbackLink::new();
    let mut inboxes = Vec::new();
    for id in ["host", "guest-a", "guest-b"] {
        inboxes.push((id, link.connect(id)));
    }

    let room = Arc::new(Room::create_with_link(
        RoomId(7),
        "host",
        VoiceChannels,
        link.clone(),
        config,
    ));
    let shutdown = CancellationToken::new();
    let driver = LivenessDriver::spawn(Arc::clone(&room), shutdown.clone());

    // Print every room event as JSON.
    let mut events = room.subscribe();
    let observer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let closed = matches!(event, RoomEvent::RoomClosed { .. });
            match serde_json::to_string(&event) {
                Ok(json) => println!("event  {json}"),
                Err(err) => tracing::warn!(error = %err, "could not encode event"),
            }
            if closed {
                break;
            }
        }
    });

    room.join("guest-b")?;
    room.join("guest-a")?;
    room.set_attribute("mode", "ranked")?;

    // Two callers ask for guest-a's session at once: one handshake.
    let guest_a = ParticipantId::new("guest-a");
    let (first, second) = tokio::join!(
        room.join_session(&guest_a, &shutdown),
        room.join_session(&guest_a, &shutdown),
    );
    let (first, second) = (first?, second?);
    println!(
        "session {} (shared: {})",
        first.session(),
        first.same_session(&second)
    );

    // The host leaves; the lowest remaining id takes over before leave
    // returns.
    room.leave(&ParticipantId::new("host")).await?;
    println!(
        "owner  {} at {}",
        room.owner().map_or_else(|| "-".to_owned(), |id| id.to_string()),
        room.epoch()
    );
    println!("room   {}", serde_json::to_string_pretty(&room.snapshot())?);

    room.teardown().await;
    driver.stop().await?;
    observer.await?;

    for (id, mut inbox) in inboxes {
        while let Ok(event) = inbox.try_recv() {
            println!("inbox  {id}: {event:?}");
        }
    }
    Ok(())
}
