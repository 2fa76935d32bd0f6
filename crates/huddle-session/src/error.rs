//! Error types for the session join layer.

use huddle_types::ParticipantId;

/// Errors returned by a session join.
///
/// Cloneable: one attempt's outcome is handed to every caller awaiting it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The caller is not an Active participant of the room.
    #[error("{0} is not an active participant of this room")]
    NotAParticipant(ParticipantId),

    /// The session layer refused or failed to establish the session.
    /// Not retried; calling again starts a new attempt.
    #[error("session join for {participant_id} failed: {source}")]
    JoinFailed {
        participant_id: ParticipantId,
        #[source]
        source: EstablishError,
    },

    /// The caller's own wait was cancelled, or the attempt was abandoned
    /// (room torn down, participant left).
    #[error("session join for {0} was cancelled")]
    Cancelled(ParticipantId),
}

/// A failure reported by the session layer.
///
/// The coordinator never interprets it; it is recorded once and cloned to
/// every awaiter of the failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EstablishError(String);

impl EstablishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<std::io::Error> for EstablishError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}
