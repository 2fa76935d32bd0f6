//! Error types for the room layer.

use huddle_types::{Epoch, ParticipantId, RoomId};

use crate::AttributeConflict;

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The participant is already in this room.
    #[error("participant {participant_id} already in room {room_id}")]
    AlreadyPresent {
        room_id: RoomId,
        participant_id: ParticipantId,
    },

    /// The participant is not in this room.
    #[error("participant {participant_id} not in room {room_id}")]
    NotFound {
        room_id: RoomId,
        participant_id: ParticipantId,
    },

    /// An owner election found no candidate left. The room is closed;
    /// observers learn about it through `RoomEvent::RoomClosed`.
    #[error("room {room_id} has no owner candidates left for epoch {epoch}")]
    ElectionExhausted { room_id: RoomId, epoch: Epoch },

    /// The room is closed and accepts no more changes.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// An optimistic attribute write lost the race.
    #[error(transparent)]
    AttributeConflict(#[from] AttributeConflict),
}

/// Errors from loading room configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid room config: {0}")]
    Parse(#[from] serde_json::Error),
}
