//! Unified error type for Huddle.

use huddle_room::{ConfigError, RoomError};
use huddle_session::SessionError;
use huddle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `huddle` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (unreachable peer, closed link).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A session join error (not a participant, join failed, cancelled).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (already present, not found, closed).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
