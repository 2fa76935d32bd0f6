//! Room membership and ownership for Huddle.
//!
//! A room tracks who is in it, who owns it and a set of shared
//! attributes, and hands out session handles to its participants.
//!
//! # Key types
//!
//! - [`Room`]: the façade; every operation a caller needs
//! - [`ParticipantRegistry`]: participants and their liveness
//! - [`AttributeStore`]: versioned key/value attributes
//! - [`OwnershipManager`]: the owner, its epoch, and elections
//! - [`RoomConfig`]: event buffer, election probing, liveness thresholds
//!
//! # Consistency
//!
//! Each component guards its own state. The room serializes membership
//! changes with the ownership changes they cause, so the owner is always
//! one of the current participants and the epoch only ever goes up.

mod attributes;
mod config;
mod error;
mod ownership;
mod registry;
mod room;

pub use attributes::{AttributeConflict, AttributeStore, LastWriterWins, MergePolicy};
pub use config::RoomConfig;
pub use error::{ConfigError, RoomError};
pub use ownership::{OwnershipManager, OwnershipState, elect};
pub use registry::{LivenessTransition, ParticipantRegistry};
pub use room::{Room, RoomSnapshot};
