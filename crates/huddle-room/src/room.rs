//! The room: participants, owner and attributes behind one consistent view.
//!
//! A `Room` composes a [`ParticipantRegistry`], an [`AttributeStore`], an
//! [`OwnershipManager`] and a [`SessionJoinCoordinator`]. Each keeps its
//! own lock; the room adds one more, the membership gate, so that a
//! membership change and the ownership change it causes land together:
//!
//! ```text
//!   leave(owner) ── gate (write) ─┬─ registry.remove(owner)
//!                                 └─ ownership: Stable → Electing(e+1)
//!                 ── no lock ──── probe candidates (optional, may suspend)
//!                 ── gate (write) ── ownership: Electing → Stable(winner, e+1)
//!   leave returns
//! ```
//!
//! If the caller drops `leave` during the probe, the election still
//! completes, unconfirmed, when the future is dropped.
//!
//! Readers take the gate shared, so `owner()` and `participants()` never
//! disagree. The gate is never held across an `.await`.

use std::collections::{BTreeMap, HashSet};

use huddle_liveness::LivenessConfig;
use huddle_session::{
    CancellationToken, JoinAttemptState, SessionError, SessionEstablisher, SessionHandle,
    SessionJoinCoordinator,
};
use huddle_transport::{DetachedLink, PeerLink};
use huddle_types::{
    AttributeValue, Epoch, Liveness, Participant, ParticipantId, RoomEvent, RoomId,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    AttributeStore, LivenessTransition, MergePolicy, OwnershipManager, OwnershipState,
    ParticipantRegistry, RoomConfig, RoomError,
};

/// Everything about a room, read at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub ownership: OwnershipState,
    /// Ordered by participant id.
    pub participants: Vec<Participant>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl RoomSnapshot {
    pub fn owner(&self) -> Option<&ParticipantId> {
        self.ownership.owner()
    }

    pub fn epoch(&self) -> Epoch {
        self.ownership.epoch()
    }
}

/// A shared, multi-participant room.
///
/// `E` establishes sessions for [`join_session`](Self::join_session); `L`
/// tells remaining participants about ownership changes. Share a room
/// between tasks with `Arc<Room<..>>`; every method takes `&self`.
pub struct Room<E: SessionEstablisher, L: PeerLink = DetachedLink> {
    id: RoomId,
    config: RoomConfig,
    /// Serializes membership and ownership changes.
    gate: RwLock<()>,
    registry: ParticipantRegistry,
    attributes: AttributeStore,
    ownership: OwnershipManager,
    coordinator: SessionJoinCoordinator<E>,
    link: L,
    events: broadcast::Sender<RoomEvent>,
}

impl<E: SessionEstablisher> Room<E> {
    /// An empty room. The first participant to join becomes the owner.
    pub fn new(id: RoomId, establisher: E, config: RoomConfig) -> Self {
        Self::with_link(id, establisher, DetachedLink, config)
    }

    /// A room created by `creator`, who is admitted and owns it at
    /// epoch 0.
    pub fn create(
        id: RoomId,
        creator: impl Into<ParticipantId>,
        establisher: E,
        config: RoomConfig,
    ) -> Self {
        Self::create_with_link(id, creator, establisher, DetachedLink, config)
    }
}

impl<E: SessionEstablisher, L: PeerLink> Room<E, L> {
    /// Like [`Room::new`], notifying participants through `link`.
    pub fn with_link(id: RoomId, establisher: E, link: L, config: RoomConfig) -> Self {
        let config = config.validated();
        let registry = ParticipantRegistry::new(id, &config.liveness);
        debug!(room_id = %id, "room created");
        Self::assemble(id, config, registry, OwnershipManager::new(id), establisher, link)
    }

    /// Like [`Room::create`], notifying participants through `link`.
    pub fn create_with_link(
        id: RoomId,
        creator: impl Into<ParticipantId>,
        establisher: E,
        link: L,
        config: RoomConfig,
    ) -> Self {
        let config = config.validated();
        let creator = creator.into();
        let (registry, _) = ParticipantRegistry::with_creator(
            id,
            &config.liveness,
            creator.clone(),
            Instant::now(),
        );
        info!(room_id = %id, %creator, "room created");
        let ownership = OwnershipManager::with_owner(id, creator);
        Self::assemble(id, config, registry, ownership, establisher, link)
    }

    fn assemble(
        id: RoomId,
        config: RoomConfig,
        registry: ParticipantRegistry,
        ownership: OwnershipManager,
        establisher: E,
        link: L,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            id,
            gate: RwLock::new(()),
            registry,
            attributes: AttributeStore::new(),
            ownership,
            coordinator: SessionJoinCoordinator::new(id, establisher),
            link,
            events,
            config,
        }
    }

    /// Replaces the attribute merge policy. Call before any attribute is
    /// written; existing attributes are discarded.
    pub fn with_merge_policy(mut self, policy: impl MergePolicy) -> Self {
        self.attributes = AttributeStore::with_policy(policy);
        self
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn liveness_config(&self) -> &LivenessConfig {
        &self.config.liveness
    }

    /// The current owner. `None` while an election runs or once the room
    /// is closed.
    pub fn owner(&self) -> Option<ParticipantId> {
        let _gate = self.gate.read();
        self.ownership.owner()
    }

    pub fn epoch(&self) -> Epoch {
        self.ownership.current_epoch()
    }

    pub fn ownership(&self) -> OwnershipState {
        self.ownership.state()
    }

    pub fn is_closed(&self) -> bool {
        self.ownership.is_closed()
    }

    /// Every participant, ordered by id.
    pub fn participants(&self) -> Vec<Participant> {
        let _gate = self.gate.read();
        self.registry.snapshot()
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.registry.get(id)
    }

    pub fn attributes(&self) -> BTreeMap<String, AttributeValue> {
        self.attributes.snapshot_all()
    }

    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.attributes.get(key)
    }

    pub fn attribute_versioned(&self, key: &str) -> Option<(AttributeValue, u64)> {
        self.attributes.get_versioned(key)
    }

    /// Owner, epoch, participants and attributes in one read.
    pub fn snapshot(&self) -> RoomSnapshot {
        let _gate = self.gate.read();
        RoomSnapshot {
            room_id: self.id,
            ownership: self.ownership.state(),
            participants: self.registry.snapshot(),
            attributes: self.attributes.snapshot_all(),
        }
    }

    /// Subscribes to this room's events, starting from now.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn join_attempt_state(&self, id: &ParticipantId) -> Option<JoinAttemptState> {
        self.coordinator.attempt_state(id)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Admits `participant_id`. The first participant of an empty room
    /// becomes its owner at epoch 0.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyPresent`] if already in the room
    /// - [`RoomError::Closed`] if the room is closed
    pub fn join(&self, participant_id: impl Into<ParticipantId>) -> Result<Participant, RoomError> {
        let participant_id = participant_id.into();
        let _gate = self.gate.write();
        if self.ownership.is_closed() {
            return Err(RoomError::Closed(self.id));
        }

        let participant = self.registry.admit(participant_id, Instant::now())?;
        let mut events = vec![RoomEvent::ParticipantJoined {
            room_id: self.id,
            participant_id: participant.id.clone(),
        }];
        if self.ownership.initialize(&participant.id) {
            events.push(RoomEvent::OwnerChanged {
                room_id: self.id,
                owner: participant.id.clone(),
                epoch: Epoch::ZERO,
            });
        }
        self.publish(&events);
        Ok(participant)
    }

    /// Removes `participant_id`. If it owned the room, the election runs
    /// to completion before this returns, so `owner()` already reports the
    /// new owner (or the room is closed).
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if not in the room.
    pub async fn leave(&self, participant_id: &ParticipantId) -> Result<(), RoomError> {
        let election = {
            let _gate = self.gate.write();
            let mut events = Vec::new();
            let election = self.depart_locked(participant_id, &mut events)?;
            self.publish(&events);
            election
        };

        if let Some(epoch) = election {
            self.run_election(epoch).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Liveness signals
    // -----------------------------------------------------------------------

    /// Records a heartbeat. Returns `true` if it recovered a Suspected
    /// participant.
    pub fn record_heartbeat(&self, participant_id: &ParticipantId) -> bool {
        let _gate = self.gate.write();
        let recovered = self.registry.record_heartbeat(participant_id, Instant::now());
        if recovered {
            self.publish_liveness(participant_id, Liveness::Active);
        }
        recovered
    }

    /// Explicit recovery signal: Suspected → Active.
    pub fn mark_active(&self, participant_id: &ParticipantId) -> bool {
        let _gate = self.gate.write();
        let recovered = self.registry.mark_active(participant_id, Instant::now());
        if recovered {
            self.publish_liveness(participant_id, Liveness::Active);
        }
        recovered
    }

    /// Active → Suspected. A suspected owner loses ownership to an
    /// election, unless no other participant is Active to take over.
    /// Returns `true` if the state changed.
    pub async fn mark_suspected(&self, participant_id: &ParticipantId) -> bool {
        let election = {
            let _gate = self.gate.write();
            if !self.registry.mark_suspected(participant_id, Instant::now()) {
                return false;
            }
            let mut events = vec![RoomEvent::LivenessChanged {
                room_id: self.id,
                participant_id: participant_id.clone(),
                liveness: Liveness::Suspected,
            }];
            let election = self.suspect_owner_locked(participant_id, &mut events);
            self.publish(&events);
            election
        };

        if let Some(epoch) = election {
            self.run_election(epoch).await;
        }
        true
    }

    /// Anything → Departed. Same as [`leave`](Self::leave) but a no-op for
    /// a participant that is already gone. Returns `true` if it removed
    /// someone.
    pub async fn mark_departed(&self, participant_id: &ParticipantId) -> bool {
        let election = {
            let _gate = self.gate.write();
            let mut events = Vec::new();
            let Ok(election) = self.depart_locked(participant_id, &mut events) else {
                return false;
            };
            self.publish(&events);
            election
        };

        if let Some(epoch) = election {
            self.run_election(epoch).await;
        }
        true
    }

    /// Applies the time-driven liveness policy at `now`, then handles the
    /// owner if the sweep suspected or removed it.
    pub async fn sweep_liveness(&self, now: Instant) -> Vec<LivenessTransition> {
        let (transitions, election) = {
            let _gate = self.gate.write();
            let transitions = self.registry.sweep(now);
            let mut events = Vec::with_capacity(transitions.len());

            for transition in &transitions {
                let participant_id = transition.participant_id.clone();
                if transition.to == Liveness::Departed {
                    self.coordinator.forget(&participant_id);
                    events.push(RoomEvent::ParticipantLeft {
                        room_id: self.id,
                        participant_id,
                    });
                } else {
                    events.push(RoomEvent::LivenessChanged {
                        room_id: self.id,
                        participant_id,
                        liveness: transition.to,
                    });
                }
            }

            // Ownership last, against the membership the sweep left behind.
            let owner_transition = self.ownership.owner().and_then(|owner| {
                transitions
                    .iter()
                    .find(|t| t.participant_id == owner)
                    .map(|t| (owner, t.to))
            });
            let election = match owner_transition {
                Some((owner, Liveness::Departed)) => {
                    let candidates = self.registry.active_ids();
                    self.begin_election_locked(&owner, candidates, &mut events)
                }
                Some((owner, Liveness::Suspected)) => {
                    self.suspect_owner_locked(&owner, &mut events)
                }
                _ => None,
            };

            self.publish(&events);
            (transitions, election)
        };

        if let Some(epoch) = election {
            self.run_election(epoch).await;
        }
        transitions
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    /// Writes an attribute and returns the key's new version.
    ///
    /// # Errors
    /// [`RoomError::Closed`] if the room is closed.
    pub fn set_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<u64, RoomError> {
        let _gate = self.gate.read();
        self.ensure_open()?;
        let key = key.into();
        let version = self.attributes.set(key.clone(), value.into());
        self.publish(&[RoomEvent::AttributeChanged {
            room_id: self.id,
            key,
            version,
        }]);
        Ok(version)
    }

    /// Writes an attribute only if the key is still at `expected`.
    ///
    /// # Errors
    /// - [`RoomError::AttributeConflict`] if another write got there first
    /// - [`RoomError::Closed`] if the room is closed
    pub fn set_attribute_if_version(
        &self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
        expected: u64,
    ) -> Result<u64, RoomError> {
        let _gate = self.gate.read();
        self.ensure_open()?;
        let key = key.into();
        let version = self
            .attributes
            .set_if_version(key.clone(), value.into(), expected)?;
        self.publish(&[RoomEvent::AttributeChanged {
            room_id: self.id,
            key,
            version,
        }]);
        Ok(version)
    }

    /// Removes an attribute. Returns the key's new version, or `None` if
    /// it had no value.
    ///
    /// # Errors
    /// [`RoomError::Closed`] if the room is closed.
    pub fn remove_attribute(&self, key: &str) -> Result<Option<u64>, RoomError> {
        let _gate = self.gate.read();
        self.ensure_open()?;
        let version = self.attributes.remove(key);
        if let Some(version) = version {
            self.publish(&[RoomEvent::AttributeChanged {
                room_id: self.id,
                key: key.to_owned(),
                version,
            }]);
        }
        Ok(version)
    }

    // -----------------------------------------------------------------------
    // Sessions and teardown
    // -----------------------------------------------------------------------

    /// Joins `participant_id`'s session.
    ///
    /// Only Active participants may join; the establisher is never called
    /// for anyone else. Concurrent calls for the same participant share a
    /// single attempt. Cancelling `cancel` gives up this caller's wait only.
    ///
    /// # Errors
    /// - [`SessionError::NotAParticipant`] if not an Active participant
    /// - [`SessionError::JoinFailed`] if the establisher failed
    /// - [`SessionError::Cancelled`] if cancelled or the room closed
    pub async fn join_session(
        &self,
        participant_id: &ParticipantId,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle<E::Handle>, SessionError> {
        let Some(membership) = self.registry.active_membership(participant_id) else {
            debug!(
                room_id = %self.id,
                %participant_id,
                "session join refused, not an active participant"
            );
            return Err(SessionError::NotAParticipant(participant_id.clone()));
        };
        self.coordinator.join(participant_id, membership, cancel).await
    }

    /// Closes the room and cancels every pending session join. Idempotent.
    pub async fn teardown(&self) {
        let events = {
            let _gate = self.gate.write();
            let Some(epoch) = self.ownership.close() else {
                return;
            };
            self.coordinator.cancel_all();
            let events = vec![RoomEvent::RoomClosed {
                room_id: self.id,
                epoch,
            }];
            self.publish(&events);
            events
        };
        self.notify_peers(&events).await;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Caller holds the gate, so teardown can't slip in behind the check.
    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.ownership.is_closed() {
            return Err(RoomError::Closed(self.id));
        }
        Ok(())
    }

    /// Removes a participant and, if it owned the room, starts the
    /// election. Caller holds the gate.
    fn depart_locked(
        &self,
        participant_id: &ParticipantId,
        events: &mut Vec<RoomEvent>,
    ) -> Result<Option<Epoch>, RoomError> {
        let removed = self.registry.remove(participant_id)?;
        self.coordinator.forget(participant_id);
        events.push(RoomEvent::ParticipantLeft {
            room_id: self.id,
            participant_id: removed.id.clone(),
        });

        if !self.ownership.is_owner(&removed.id) {
            return Ok(None);
        }
        let candidates = self.registry.active_ids();
        Ok(self.begin_election_locked(&removed.id, candidates, events))
    }

    /// Starts an election for a suspected owner, unless nobody else is
    /// Active. Caller holds the gate.
    fn suspect_owner_locked(
        &self,
        participant_id: &ParticipantId,
        events: &mut Vec<RoomEvent>,
    ) -> Option<Epoch> {
        if !self.ownership.is_owner(participant_id) {
            return None;
        }
        let candidates = self.registry.active_ids();
        if candidates.is_empty() {
            debug!(
                room_id = %self.id,
                owner = %participant_id,
                "suspected owner has no active peers, ownership kept"
            );
            return None;
        }
        self.begin_election_locked(participant_id, candidates, events)
    }

    fn begin_election_locked(
        &self,
        lost_owner: &ParticipantId,
        candidates: Vec<ParticipantId>,
        events: &mut Vec<RoomEvent>,
    ) -> Option<Epoch> {
        let (epoch, candidates) = self.ownership.begin_election(lost_owner, candidates)?;
        events.push(RoomEvent::ElectionStarted {
            room_id: self.id,
            epoch,
            candidates,
        });
        Some(epoch)
    }

    /// Completes the election for `epoch`, probing candidates first when
    /// configured to.
    ///
    /// The election settles even if the caller stops polling mid-probe:
    /// [`PendingElection`] completes it without confirmation on drop.
    async fn run_election(&self, epoch: Epoch) {
        let mut pending = PendingElection {
            room: self,
            epoch,
            settled: false,
        };
        let unreachable = if self.config.confirm_candidates {
            self.probe_candidates(epoch).await
        } else {
            HashSet::new()
        };
        pending.settled = true;

        let events = self.complete_election(epoch, &unreachable);
        self.notify_peers(&events).await;
    }

    /// Settles the election for `epoch` under the gate and publishes the
    /// outcome. A superseded epoch yields no events.
    fn complete_election(
        &self,
        epoch: Epoch,
        unreachable: &HashSet<ParticipantId>,
    ) -> Vec<RoomEvent> {
        let _gate = self.gate.write();
        let outcome = self.ownership.complete_election(epoch, |id| {
            self.registry.is_active(id) && !unreachable.contains(id)
        });
        let event = match outcome {
            Ok(Some(owner)) => Some(RoomEvent::OwnerChanged {
                room_id: self.id,
                owner,
                epoch,
            }),
            Ok(None) => None,
            Err(err) => {
                info!(room_id = %self.id, error = %err, "room closed by election");
                self.coordinator.cancel_all();
                Some(RoomEvent::RoomClosed {
                    room_id: self.id,
                    epoch,
                })
            }
        };
        let events: Vec<RoomEvent> = event.into_iter().collect();
        self.publish(&events);
        events
    }

    /// Probes every candidate of the election for `epoch` and returns the
    /// ones that didn't answer in time.
    async fn probe_candidates(&self, epoch: Epoch) -> HashSet<ParticipantId> {
        let mut unreachable = HashSet::new();
        let Some(candidates) = self.ownership.candidates(epoch) else {
            return unreachable;
        };

        for candidate in candidates {
            let probe = time::timeout(self.config.probe_timeout, self.link.probe(&candidate)).await;
            match probe {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    debug!(room_id = %self.id, %candidate, %epoch, "candidate unreachable");
                    unreachable.insert(candidate);
                }
                Ok(Err(err)) => {
                    warn!(room_id = %self.id, %candidate, %epoch, error = %err, "candidate probe failed");
                    unreachable.insert(candidate);
                }
                Err(_) => {
                    warn!(
                        room_id = %self.id,
                        %candidate,
                        %epoch,
                        timeout_ms = u64::try_from(self.config.probe_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                        "candidate probe timed out"
                    );
                    unreachable.insert(candidate);
                }
            }
        }
        unreachable
    }

    fn publish_liveness(&self, participant_id: &ParticipantId, liveness: Liveness) {
        self.publish(&[RoomEvent::LivenessChanged {
            room_id: self.id,
            participant_id: participant_id.clone(),
            liveness,
        }]);
    }

    /// Broadcasts to observers. Having no observer is not an error.
    fn publish(&self, events: &[RoomEvent]) {
        for event in events {
            trace!(room_id = %self.id, ?event, "room event");
            let _ = self.events.send(event.clone());
        }
    }

    /// Forwards ownership changes and closure to every remaining
    /// participant. Failures are logged, never returned.
    async fn notify_peers(&self, events: &[RoomEvent]) {
        let notices: Vec<&RoomEvent> = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    RoomEvent::OwnerChanged { .. } | RoomEvent::RoomClosed { .. }
                )
            })
            .collect();
        if notices.is_empty() {
            return;
        }

        let recipients = self.registry.snapshot();
        for event in notices {
            for participant in &recipients {
                if let Err(err) = self.link.send(&participant.id, event).await {
                    warn!(
                        room_id = %self.id,
                        participant_id = %participant.id,
                        error = %err,
                        "failed to notify participant"
                    );
                }
            }
        }
    }
}

/// An election between its two steps.
///
/// Dropped unsettled means the caller abandoned `run_election` while a
/// probe was in flight; the election then completes without confirmation
/// so the room is never left in `Electing`. Peers are not notified on
/// this path since notification needs to await.
struct PendingElection<'a, E: SessionEstablisher, L: PeerLink> {
    room: &'a Room<E, L>,
    epoch: Epoch,
    settled: bool,
}

impl<E: SessionEstablisher, L: PeerLink> Drop for PendingElection<'_, E, L> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            room_id = %self.room.id,
            epoch = %self.epoch,
            "election abandoned mid-probe, completing without confirmation"
        );
        let events = self.room.complete_election(self.epoch, &HashSet::new());
        if !events.is_empty() {
            debug!(
                room_id = %self.room.id,
                epoch = %self.epoch,
                "abandoned election outcome published to observers only"
            );
        }
    }
}
