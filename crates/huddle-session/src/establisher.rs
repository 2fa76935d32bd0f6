//! The session layer's side of the join handshake.
//!
//! Huddle doesn't implement sessions. Whatever protocol runs once
//! participants are joined (state sync, voice, a game loop) lives behind
//! the [`SessionEstablisher`] trait: one async method that takes a room
//! and a participant and returns an opaque, collaborator-specific handle.

use std::future::Future;

use huddle_types::{ParticipantId, RoomId};

use crate::EstablishError;

/// Establishes a participant's session for a room.
///
/// The associated `Handle` type is whatever the session layer wants the
/// participant to hold; the coordinator wraps it in an `Arc` and never
/// looks inside, so it doesn't have to be `Clone`.
///
/// # Example
///
/// ```rust
/// use huddle_session::{EstablishError, SessionEstablisher};
/// use huddle_types::{ParticipantId, RoomId};
///
/// /// Names a channel after the room and participant.
/// /// Only for local testing; nothing is actually connected.
/// struct ChannelEstablisher;
///
/// impl SessionEstablisher for ChannelEstablisher {
///     type Handle = String;
///
///     async fn establish(
///         &self,
///         room_id: RoomId,
///         participant_id: &ParticipantId,
///     ) -> Result<String, EstablishError> {
///         Ok(format!("{room_id}/{participant_id}"))
///     }
/// }
/// ```
pub trait SessionEstablisher: Send + Sync + 'static {
    /// The opaque session handle produced on success.
    type Handle: Send + Sync + 'static;

    /// Performs the session handshake for `participant_id` in `room_id`.
    ///
    /// May take network round-trips. The coordinator calls this at most
    /// once per pending attempt and may drop the future if every caller
    /// waiting on the attempt gives up.
    fn establish(
        &self,
        room_id: RoomId,
        participant_id: &ParticipantId,
    ) -> impl Future<Output = Result<Self::Handle, EstablishError>> + Send;
}
