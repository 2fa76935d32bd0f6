//! The opaque handle a participant holds once joined to a session.

use std::fmt;
use std::sync::Arc;

use huddle_types::{MembershipId, ParticipantId, RoomId};

/// A live session handle.
///
/// Cloning is cheap and every clone refers to the same underlying session.
/// Equality is identity: two handles are equal only if they came out of
/// the same successful join attempt.
pub struct SessionHandle<H> {
    room_id: RoomId,
    participant_id: ParticipantId,
    membership: MembershipId,
    session: Arc<H>,
}

impl<H> SessionHandle<H> {
    pub(crate) fn new(
        room_id: RoomId,
        participant_id: ParticipantId,
        membership: MembershipId,
        session: H,
    ) -> Self {
        Self {
            room_id,
            participant_id,
            membership,
            session: Arc::new(session),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// The room membership this handle was issued for.
    pub fn membership(&self) -> MembershipId {
        self.membership
    }

    /// The session layer's own handle.
    pub fn session(&self) -> &H {
        &self.session
    }

    /// Returns `true` if both handles refer to the same session.
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }
}

impl<H> Clone for SessionHandle<H> {
    fn clone(&self) -> Self {
        Self {
            room_id: self.room_id,
            participant_id: self.participant_id.clone(),
            membership: self.membership,
            session: Arc::clone(&self.session),
        }
    }
}

impl<H> PartialEq for SessionHandle<H> {
    fn eq(&self, other: &Self) -> bool {
        self.same_session(other)
    }
}

impl<H> Eq for SessionHandle<H> {}

impl<H> fmt::Debug for SessionHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("room_id", &self.room_id)
            .field("participant_id", &self.participant_id)
            .field("membership", &self.membership)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(session: &str) -> SessionHandle<String> {
        SessionHandle::new(
            RoomId(1),
            ParticipantId::new("alice"),
            MembershipId(1),
            session.to_string(),
        )
    }

    #[test]
    fn test_clone_is_same_session() {
        let a = handle("s");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.session(), "s");
    }

    #[test]
    fn test_equal_contents_are_not_same_session() {
        assert_ne!(handle("s"), handle("s"));
    }
}
