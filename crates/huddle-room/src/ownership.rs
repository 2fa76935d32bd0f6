//! Room ownership: who owns the room, in which epoch, and how a new owner
//! is elected when the current one is lost.
//!
//! ```text
//!  Unassigned ──(first participant)──→ Stable(owner, e0)
//!                                          │
//!                     owner suspected / departed
//!                                          ↓
//!         Stable(winner, e+1) ←──── Electing(candidates, e+1)
//!                                          │
//!                                   no candidate left
//!                                          ↓
//!                                   Closed(e+1)
//! ```
//!
//! An election is split in two steps. [`begin_election`] fixes the
//! candidate set and the epoch the election will produce;
//! [`complete_election`] picks the winner. Whatever happens in between
//! (for example probing candidates over the network) runs without any
//! lock held, and a completion for an epoch that is no longer current is
//! discarded.
//!
//! [`begin_election`]: OwnershipManager::begin_election
//! [`complete_election`]: OwnershipManager::complete_election

use huddle_types::{Epoch, ParticipantId, RoomId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::RoomError;

/// The ownership state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum OwnershipState {
    /// Nobody has joined yet.
    Unassigned,
    /// `owner` owns the room for `epoch`.
    Stable { owner: ParticipantId, epoch: Epoch },
    /// The owner was lost; `epoch` is the epoch the election will produce.
    Electing {
        candidates: Vec<ParticipantId>,
        epoch: Epoch,
    },
    /// The room is closed. Terminal.
    Closed { epoch: Epoch },
}

impl OwnershipState {
    /// The epoch this state is tagged with.
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::Unassigned => Epoch::ZERO,
            Self::Stable { epoch, .. }
            | Self::Electing { epoch, .. }
            | Self::Closed { epoch } => *epoch,
        }
    }

    pub fn owner(&self) -> Option<&ParticipantId> {
        match self {
            Self::Stable { owner, .. } => Some(owner),
            _ => None,
        }
    }
}

/// Picks the election winner: the lowest participant id.
///
/// Deterministic for a given candidate set, so two nodes with the same
/// view of the room pick the same owner without talking to each other.
pub fn elect<'a, I>(candidates: I) -> Option<&'a ParticipantId>
where
    I: IntoIterator<Item = &'a ParticipantId>,
{
    candidates.into_iter().min()
}

/// Holds the ownership record of one room.
#[derive(Debug)]
pub struct OwnershipManager {
    room_id: RoomId,
    state: Mutex<OwnershipState>,
}

impl OwnershipManager {
    /// A manager for a room nobody has joined yet.
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            state: Mutex::new(OwnershipState::Unassigned),
        }
    }

    /// A manager for a room created by `owner` (epoch 0).
    pub fn with_owner(room_id: RoomId, owner: ParticipantId) -> Self {
        Self {
            room_id,
            state: Mutex::new(OwnershipState::Stable {
                owner,
                epoch: Epoch::ZERO,
            }),
        }
    }

    /// A copy of the current state.
    pub fn state(&self) -> OwnershipState {
        self.state.lock().clone()
    }

    /// The current owner. `None` while unassigned, electing or closed.
    pub fn owner(&self) -> Option<ParticipantId> {
        self.state.lock().owner().cloned()
    }

    pub fn is_owner(&self, id: &ParticipantId) -> bool {
        self.state.lock().owner() == Some(id)
    }

    pub fn current_epoch(&self) -> Epoch {
        self.state.lock().epoch()
    }

    /// Whether a decision tagged with `epoch` is still current.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current_epoch() == epoch
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), OwnershipState::Closed { .. })
    }

    /// Unassigned → Stable(`owner`, 0). Returns `false` if ownership was
    /// already assigned at some point.
    pub fn initialize(&self, owner: &ParticipantId) -> bool {
        let mut state = self.state.lock();
        if *state != OwnershipState::Unassigned {
            return false;
        }
        *state = OwnershipState::Stable {
            owner: owner.clone(),
            epoch: Epoch::ZERO,
        };
        info!(room_id = %self.room_id, %owner, "room ownership initialized");
        true
    }

    /// Stable(`lost_owner`, e) → Electing(candidates, e+1).
    ///
    /// `lost_owner` is dropped from the candidate set; the rest is sorted
    /// and deduplicated. Returns the election epoch and the final candidate
    /// set, or `None` if `lost_owner` isn't the current owner (already
    /// electing, closed, or someone else owns the room).
    pub fn begin_election(
        &self,
        lost_owner: &ParticipantId,
        candidates: impl IntoIterator<Item = ParticipantId>,
    ) -> Option<(Epoch, Vec<ParticipantId>)> {
        let mut state = self.state.lock();
        let epoch = match &*state {
            OwnershipState::Stable { owner, epoch } if owner == lost_owner => epoch.next(),
            _ => return None,
        };

        let mut candidates: Vec<ParticipantId> = candidates
            .into_iter()
            .filter(|id| id != lost_owner)
            .collect();
        candidates.sort();
        candidates.dedup();

        info!(
            room_id = %self.room_id,
            %lost_owner,
            %epoch,
            candidates = candidates.len(),
            "owner lost, election started"
        );

        *state = OwnershipState::Electing {
            candidates: candidates.clone(),
            epoch,
        };
        Some((epoch, candidates))
    }

    /// Candidates of the election for `epoch`, or `None` if that election
    /// is not the one in progress.
    pub fn candidates(&self, epoch: Epoch) -> Option<Vec<ParticipantId>> {
        match &*self.state.lock() {
            OwnershipState::Electing {
                candidates,
                epoch: current,
            } if *current == epoch => Some(candidates.clone()),
            _ => None,
        }
    }

    /// Electing(candidates, `epoch`) → Stable(winner, `epoch`).
    ///
    /// The winner is the lowest id among the candidates for which
    /// `eligible` holds (the room passes "still Active and reachable").
    ///
    /// Returns `Ok(Some(winner))` on success and `Ok(None)` if the election
    /// for `epoch` is no longer in progress (a stale completion, discarded).
    ///
    /// # Errors
    /// [`RoomError::ElectionExhausted`] if no candidate is eligible. The
    /// room is Closed by then; the caller reports it to observers.
    pub fn complete_election(
        &self,
        epoch: Epoch,
        eligible: impl Fn(&ParticipantId) -> bool,
    ) -> Result<Option<ParticipantId>, RoomError> {
        let mut state = self.state.lock();
        let winner = match &*state {
            OwnershipState::Electing {
                candidates,
                epoch: current,
            } if *current == epoch => {
                elect(candidates.iter().filter(|id| eligible(id))).cloned()
            }
            other => {
                warn!(
                    room_id = %self.room_id,
                    %epoch,
                    current = %other.epoch(),
                    "stale election completion discarded"
                );
                return Ok(None);
            }
        };

        match winner {
            Some(owner) => {
                info!(room_id = %self.room_id, %owner, %epoch, "new owner elected");
                *state = OwnershipState::Stable {
                    owner: owner.clone(),
                    epoch,
                };
                Ok(Some(owner))
            }
            None => {
                *state = OwnershipState::Closed { epoch };
                Err(RoomError::ElectionExhausted {
                    room_id: self.room_id,
                    epoch,
                })
            }
        }
    }

    /// Anything → Closed, keeping the current epoch. Returns the epoch, or
    /// `None` if the room was already closed.
    pub fn close(&self) -> Option<Epoch> {
        let mut state = self.state.lock();
        if matches!(*state, OwnershipState::Closed { .. }) {
            return None;
        }
        let epoch = state.epoch();
        *state = OwnershipState::Closed { epoch };
        info!(room_id = %self.room_id, %epoch, "room closed");
        Some(epoch)
    }
}
