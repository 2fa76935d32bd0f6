//! Shared vocabulary for Huddle.
//!
//! This crate defines the values that every other layer passes around:
//!
//! - **Identity** ([`RoomId`], [`ParticipantId`], [`MembershipId`]):
//!   who and where.
//! - **Ownership generations** ([`Epoch`]): which ownership decision is
//!   current.
//! - **Membership snapshots** ([`Participant`], [`Liveness`]): immutable
//!   copies handed out by the registry.
//! - **Attributes** ([`AttributeValue`]): opaque blobs stored per room.
//! - **Events** ([`RoomEvent`]): what observers and peers are told.
//!
//! # Architecture
//!
//! ```text
//! Transport (send to participant) ─┐
//! Session (establish handle)  ─────┼─→ Room (membership + ownership)
//! Liveness (timeouts)  ────────────┘
//!            all of them speak huddle-types
//! ```
//!
//! Nothing here is tied to a wire format. The types derive serde traits
//! so transport and session collaborators can pick their own encoding.

mod event;
mod types;

pub use event::RoomEvent;
pub use types::{
    AttributeValue, Epoch, Liveness, MembershipId, Participant, ParticipantId,
    RoomId,
};
