//! # Huddle
//!
//! Room membership and ownership for live multiplayer sessions.
//!
//! A room keeps track of who is in it, who owns it and a set of shared
//! attributes. When the owner goes away, the remaining participants elect
//! a new one; when a participant wants into the live session, the room
//! makes sure only one handshake runs for it, however many callers ask.
//!
//! Huddle doesn't move bytes or run sessions itself. The network layer
//! plugs in through [`PeerLink`](huddle_transport::PeerLink), the session
//! layer through [`SessionEstablisher`](huddle_session::SessionEstablisher).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use huddle::prelude::*;
//!
//! struct Echo;
//!
//! impl SessionEstablisher for Echo {
//!     type Handle = String;
//!
//!     async fn establish(
//!         &self,
//!         room_id: RoomId,
//!         participant_id: &ParticipantId,
//!     ) -> Result<String, EstablishError> {
//!         Ok(format!("{room_id}/{participant_id}"))
//!     }
//! }
//!
//! # async fn run() -> Result<(), HuddleError> {
//! huddle::init_tracing();
//!
//! let room = Arc::new(Room::create(RoomId(1), "alice", Echo, RoomConfig::default()));
//! let shutdown = CancellationToken::new();
//! let driver = LivenessDriver::spawn(Arc::clone(&room), shutdown.clone());
//!
//! room.join("bob")?;
//! let session = room.join_session(&"bob".into(), &shutdown).await?;
//! println!("bob joined {}", session.session());
//!
//! room.leave(&"alice".into()).await?;
//! assert_eq!(room.owner(), Some("bob".into()));
//!
//! driver.stop().await.ok();
//! # Ok(())
//! # }
//! ```

mod driver;
mod error;

pub use driver::LivenessDriver;
pub use error::HuddleError;

pub use huddle_liveness as liveness;
pub use huddle_room as room;
pub use huddle_session as session;
pub use huddle_transport as transport;
pub use huddle_types as types;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// For binaries. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Common imports for Huddle users.
pub mod prelude {
    pub use crate::{HuddleError, LivenessDriver};
    pub use huddle_liveness::LivenessConfig;
    pub use huddle_room::{OwnershipState, Room, RoomConfig, RoomError, RoomSnapshot};
    pub use huddle_session::{
        CancellationToken, EstablishError, SessionError, SessionEstablisher, SessionHandle,
    };
    pub use huddle_transport::{DetachedLink, LoopbackLink, PeerLink, TransportError};
    pub use huddle_types::{
        AttributeValue, Epoch, Liveness, Participant, ParticipantId, RoomEvent, RoomId,
    };
}
