//! Peer addressing for Huddle.
//!
//! Rooms never talk to sockets. They only know how to "send to participant
//! id" and, when an election wants confirmation, how to "probe participant
//! id". The [`PeerLink`] trait is that capability; the real network layer
//! implements it elsewhere.
//!
//! # Feature Flags
//!
//! - `loopback` (default): [`LoopbackLink`], an in-process link backed by
//!   Tokio channels, for demos and tests.

mod error;
#[cfg(feature = "loopback")]
mod loopback;

pub use error::TransportError;
#[cfg(feature = "loopback")]
pub use loopback::LoopbackLink;

use std::future::Future;

use huddle_types::{ParticipantId, RoomEvent};

/// Delivers room events to participants and answers reachability probes.
///
/// Implementations must not call back into the room from inside these
/// methods; the room calls them without holding any of its locks, but a
/// re-entrant call would still observe a half-finished leave or election.
pub trait PeerLink: Send + Sync + 'static {
    /// Sends `event` to the participant identified by `to`.
    fn send(
        &self,
        to: &ParticipantId,
        event: &RoomEvent,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Asks the transport whether `id` is reachable right now.
    ///
    /// Used by owner election when candidate confirmation is enabled.
    /// Defaults to "reachable" for transports with no probe mechanism.
    fn probe(
        &self,
        _id: &ParticipantId,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send {
        async { Ok(true) }
    }
}

/// A link that delivers nothing and reports everyone reachable.
///
/// This is what a room uses when no transport has been wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLink;

impl PeerLink for DetachedLink {
    async fn send(
        &self,
        to: &ParticipantId,
        event: &RoomEvent,
    ) -> Result<(), TransportError> {
        tracing::trace!(%to, ?event, "detached link dropped event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_types::RoomId;

    #[tokio::test]
    async fn test_detached_link_send_always_succeeds() {
        let link = DetachedLink;
        let event = RoomEvent::RoomClosed {
            room_id: RoomId(1),
            epoch: huddle_types::Epoch(2),
        };
        assert!(link.send(&ParticipantId::new("a"), &event).await.is_ok());
    }

    #[tokio::test]
    async fn test_detached_link_probe_defaults_to_reachable() {
        let link = DetachedLink;
        assert!(link.probe(&ParticipantId::new("a")).await.unwrap());
    }
}
