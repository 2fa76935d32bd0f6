//! Identity, ownership-generation and membership value types.
//!
//! Every type in this module is a plain value: cheap to clone, safe to
//! hand to other tasks, and never a reference into live room state. The
//! registry and ownership manager give out these values as snapshots.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable, opaque identifier for a room.
///
/// Assigned by the matchmaking service when the room record is created and
/// immutable for the room's whole lifetime. `#[serde(transparent)]` keeps
/// it a bare number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A participant's identifier, unique within a room's lifetime.
///
/// Participant ids are strings handed out by whatever identity provider
/// the matchmaking service uses. They are totally ordered
/// (lexicographically), and that ordering is what owner election uses to
/// break ties: the lowest id among the candidates wins.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifies one admission of a participant into a room.
///
/// The registry issues a fresh `MembershipId` on every successful admit.
/// A participant who leaves and is admitted again gets a new one, which
/// is how the session coordinator tells "same membership, return the
/// existing handle" apart from "new membership, start a fresh attempt".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MembershipId(pub u64);

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Epoch
// ---------------------------------------------------------------------------

/// An ownership generation.
///
/// Starts at [`Epoch::ZERO`] when the first owner is installed and
/// increments on every successful ownership change. Within a room only one
/// epoch is ever current; anything tagged with an older epoch is stale and
/// must be discarded by whoever consumes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch of a room's first owner.
    pub const ZERO: Epoch = Epoch(0);

    /// The epoch that follows this one.
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Local belief about whether a participant is reachable.
///
/// ```text
///   Active ──(missed heartbeats)──→ Suspected ──(grace timeout)──→ Departed
///     ↑                                 │
///     └──────(explicit signal)──────────┘
///
///   Active / Suspected ──(explicit leave)──→ Departed
/// ```
///
/// This is not globally synchronized: two rooms (or two processes) may
/// disagree about the same participant for a while. Departed is terminal;
/// a departed participant is removed from the room and must be admitted
/// again to come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Liveness {
    Active,
    Suspected,
    Departed,
}

impl Liveness {
    /// Returns `true` for [`Liveness::Active`].
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Suspected => write!(f, "Suspected"),
            Self::Departed => write!(f, "Departed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A point-in-time copy of one room member.
///
/// Mutations happen only inside the participant registry; everyone else
/// (ownership manager, session coordinator, observers) holds these
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Who this is.
    pub id: ParticipantId,
    /// Reachability as of the snapshot.
    pub liveness: Liveness,
    /// Which admission of `id` this snapshot belongs to.
    pub membership: MembershipId,
}

impl Participant {
    /// Returns `true` if the participant was Active when snapshotted.
    pub fn is_active(&self) -> bool {
        self.liveness.is_active()
    }
}

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// An opaque, immutable attribute value.
///
/// The core never looks inside: it stores the bytes, hands out cheap
/// clones, and compares them by content. [`ptr_eq`](Self::ptr_eq) checks
/// identity for collaborators that want reference comparison.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AttributeValue(Arc<[u8]>);

impl AttributeValue {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if both values share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "AttributeValue({text:?})"),
            Err(_) => write!(f, "AttributeValue({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<String> for AttributeValue {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<u8>::deserialize(deserializer).map(Self::from)
    }
}
