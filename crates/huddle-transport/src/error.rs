use huddle_types::ParticipantId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No route to the participant is known.
    #[error("participant {0} is unreachable")]
    Unreachable(ParticipantId),

    /// The participant's link existed but has been closed.
    #[error("link to {0} closed")]
    LinkClosed(ParticipantId),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
