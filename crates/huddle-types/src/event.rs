//! Room events: what observers and peers are told about a room.
//!
//! Events are emitted after the corresponding state change is fully
//! applied, so an observer that reads the room in response to an event
//! never sees the room "before" it.

use serde::{Deserialize, Serialize};

use crate::{Epoch, Liveness, ParticipantId, RoomId};

/// A change to a room's membership, ownership or attributes.
///
/// `#[serde(tag = "type")]` produces `{ "type": "OwnerChanged", ... }`,
/// the same internally tagged shape transport collaborators already use
/// for their own messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    // -- Membership --

    /// A participant was admitted.
    ParticipantJoined {
        room_id: RoomId,
        participant_id: ParticipantId,
    },

    /// A participant was removed (explicit leave or liveness timeout).
    ParticipantLeft {
        room_id: RoomId,
        participant_id: ParticipantId,
    },

    /// A participant's liveness changed without it leaving.
    LivenessChanged {
        room_id: RoomId,
        participant_id: ParticipantId,
        liveness: Liveness,
    },

    // -- Ownership --

    /// The owner was lost and an election for `epoch` began.
    ElectionStarted {
        room_id: RoomId,
        epoch: Epoch,
        candidates: Vec<ParticipantId>,
    },

    /// A new owner is in place for `epoch`.
    OwnerChanged {
        room_id: RoomId,
        owner: ParticipantId,
        epoch: Epoch,
    },

    /// The last election found no candidates. Ownership is undefined and
    /// the room id may be reclaimed.
    RoomClosed { room_id: RoomId, epoch: Epoch },

    // -- Attributes --

    /// An attribute was written or removed; `version` is the key's new
    /// version counter.
    AttributeChanged {
        room_id: RoomId,
        key: String,
        version: u64,
    },
}

impl RoomEvent {
    /// The room this event belongs to.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::ParticipantJoined { room_id, .. }
            | Self::ParticipantLeft { room_id, .. }
            | Self::LivenessChanged { room_id, .. }
            | Self::ElectionStarted { room_id, .. }
            | Self::OwnerChanged { room_id, .. }
            | Self::RoomClosed { room_id, .. }
            | Self::AttributeChanged { room_id, .. } => *room_id,
        }
    }

    /// The ownership epoch this event is tagged with, if it is an
    /// ownership event.
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::ElectionStarted { epoch, .. }
            | Self::OwnerChanged { epoch, .. }
            | Self::RoomClosed { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_changed_serializes_internally_tagged() {
        let event = RoomEvent::OwnerChanged {
            room_id: RoomId(3),
            owner: ParticipantId::new("p3"),
            epoch: Epoch(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OwnerChanged");
        assert_eq!(json["owner"], "p3");
        assert_eq!(json["epoch"], 1);
        assert_eq!(json["room_id"], 3);
    }

    #[test]
    fn test_epoch_only_on_ownership_events() {
        let closed = RoomEvent::RoomClosed {
            room_id: RoomId(1),
            epoch: Epoch(4),
        };
        let joined = RoomEvent::ParticipantJoined {
            room_id: RoomId(1),
            participant_id: ParticipantId::new("a"),
        };
        assert_eq!(closed.epoch(), Some(Epoch(4)));
        assert_eq!(joined.epoch(), None);
        assert_eq!(joined.room_id(), RoomId(1));
    }
}
