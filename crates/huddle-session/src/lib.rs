//! Session join coordination for Huddle.
//!
//! Joining a room makes you a participant. Joining the room's *session*
//! gives you a live handle to whatever protocol runs once everyone is in.
//! This crate owns the second step:
//!
//! 1. **Capability**: the [`SessionEstablisher`] trait, implemented by the
//!    session layer, turns `(room, participant)` into an opaque handle.
//! 2. **Handle**: [`SessionHandle`] wraps that opaque value together with
//!    the membership it was issued for.
//! 3. **Coordination**: [`SessionJoinCoordinator`] guarantees one
//!    in-flight attempt per participant, shares its outcome with every
//!    concurrent caller, and survives individual callers cancelling.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room (above)            ← checks membership, then asks the coordinator
//!     ↕
//! Session join (this crate) ← one attempt per participant, shared outcome
//!     ↕
//! Session layer (external)  ← SessionEstablisher::establish
//! ```

mod coordinator;
mod error;
mod establisher;
mod handle;

pub use coordinator::{JoinAttemptState, SessionJoinCoordinator};
pub use error::{EstablishError, SessionError};
pub use establisher::SessionEstablisher;
pub use handle::SessionHandle;
pub use tokio_util::sync::CancellationToken;
