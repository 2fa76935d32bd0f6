//! In-process link: every participant is an unbounded Tokio channel.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_types::{ParticipantId, RoomEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{PeerLink, TransportError};

/// Channel sender for delivering events to one participant.
type EventSender = mpsc::UnboundedSender<RoomEvent>;

/// A [`PeerLink`] that routes events to in-process channels.
///
/// Cheap to clone; clones share the same routing table. A participant is
/// reachable while the receiver returned by [`connect`](Self::connect) is
/// alive.
#[derive(Debug, Clone, Default)]
pub struct LoopbackLink {
    routes: Arc<Mutex<HashMap<ParticipantId, EventSender>>>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns the receiving end of its channel.
    ///
    /// Connecting an id that is already connected replaces the old route.
    pub fn connect(
        &self,
        id: impl Into<ParticipantId>,
    ) -> mpsc::UnboundedReceiver<RoomEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = id.into();
        tracing::debug!(participant_id = %id, "loopback route connected");
        self.routes.lock().insert(id, tx);
        rx
    }

    /// Drops the route to `id`. Later sends fail with `Unreachable`.
    pub fn disconnect(&self, id: &ParticipantId) {
        if self.routes.lock().remove(id).is_some() {
            tracing::debug!(participant_id = %id, "loopback route dropped");
        }
    }

    /// Number of registered routes (live or not).
    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }

    fn route(&self, id: &ParticipantId) -> Option<EventSender> {
        self.routes.lock().get(id).cloned()
    }
}

impl PeerLink for LoopbackLink {
    async fn send(
        &self,
        to: &ParticipantId,
        event: &RoomEvent,
    ) -> Result<(), TransportError> {
        let sender = self
            .route(to)
            .ok_or_else(|| TransportError::Unreachable(to.clone()))?;
        sender
            .send(event.clone())
            .map_err(|_| TransportError::LinkClosed(to.clone()))
    }

    async fn probe(&self, id: &ParticipantId) -> Result<bool, TransportError> {
        Ok(self.route(id).is_some_and(|tx| !tx.is_closed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_types::{Epoch, RoomId};

    fn owner_changed(owner: &str) -> RoomEvent {
        RoomEvent::OwnerChanged {
            room_id: RoomId(1),
            owner: ParticipantId::new(owner),
            epoch: Epoch(1),
        }
    }

    #[tokio::test]
    async fn test_send_delivers_to_connected_participant() {
        let link = LoopbackLink::new();
        let mut rx = link.connect("alice");

        link.send(&ParticipantId::new("alice"), &owner_changed("bob"))
            .await
            .expect("route exists");

        assert_eq!(rx.recv().await, Some(owner_changed("bob")));
    }

    #[tokio::test]
    async fn test_send_unknown_participant_is_unreachable() {
        let link = LoopbackLink::new();
        let result =
            link.send(&ParticipantId::new("ghost"), &owner_changed("a")).await;
        assert!(matches!(result, Err(TransportError::Unreachable(p)) if p.as_str() == "ghost"));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_reports_closed() {
        let link = LoopbackLink::new();
        drop(link.connect("alice"));
        let result =
            link.send(&ParticipantId::new("alice"), &owner_changed("a")).await;
        assert!(matches!(result, Err(TransportError::LinkClosed(_))));
    }

    #[tokio::test]
    async fn test_probe_tracks_receiver_lifetime() {
        let link = LoopbackLink::new();
        let alice = ParticipantId::new("alice");
        assert!(!link.probe(&alice).await.unwrap());

        let rx = link.connect("alice");
        assert!(link.probe(&alice).await.unwrap());

        drop(rx);
        assert!(!link.probe(&alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_routes() {
        let link = LoopbackLink::new();
        let other = link.clone();
        let _rx = link.connect("alice");
        assert_eq!(other.len(), 1);
        other.disconnect(&ParticipantId::new("alice"));
        assert!(link.is_empty());
    }
}
