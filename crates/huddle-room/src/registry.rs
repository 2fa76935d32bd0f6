//! The set of participants attached to a room and their liveness.
//!
//! Entries are kept in a `BTreeMap` so snapshots come out ordered by
//! participant id, the same order owner election uses.
//!
//! Liveness has two kinds of input:
//!
//! - **Explicit signals** from the transport: heartbeats, "suspect this
//!   participant", "this participant is back". Only these can move a
//!   participant back to Active.
//! - **Elapsed time**, applied by [`ParticipantRegistry::sweep`] with the
//!   thresholds from [`LivenessConfig`].
//!
//! A participant that reaches Departed is removed in the same step.

use std::collections::BTreeMap;

use huddle_liveness::{HeartbeatRecord, LivenessConfig, LivenessPolicy, Verdict};
use huddle_types::{Liveness, MembershipId, Participant, ParticipantId, RoomId};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::RoomError;

/// One liveness change produced by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessTransition {
    pub participant_id: ParticipantId,
    pub membership: MembershipId,
    pub from: Liveness,
    pub to: Liveness,
}

#[derive(Debug)]
struct Entry {
    membership: MembershipId,
    heartbeat: HeartbeatRecord,
}

impl Entry {
    fn participant(&self, id: &ParticipantId) -> Participant {
        Participant {
            id: id.clone(),
            liveness: self.heartbeat.liveness(),
            membership: self.membership,
        }
    }
}

#[derive(Debug)]
struct Inner {
    entries: BTreeMap<ParticipantId, Entry>,
    /// Next membership id to issue. Never reused within the room.
    next_membership: u64,
}

impl Inner {
    fn admit(&mut self, id: ParticipantId, now: Instant) -> Participant {
        let membership = MembershipId(self.next_membership);
        self.next_membership += 1;
        let entry = Entry {
            membership,
            heartbeat: HeartbeatRecord::new(now),
        };
        let participant = entry.participant(&id);
        self.entries.insert(id, entry);
        participant
    }
}

/// Tracks who is in a room.
#[derive(Debug)]
pub struct ParticipantRegistry {
    room_id: RoomId,
    policy: LivenessPolicy,
    inner: RwLock<Inner>,
}

impl ParticipantRegistry {
    pub fn new(room_id: RoomId, config: &LivenessConfig) -> Self {
        Self {
            room_id,
            policy: LivenessPolicy::new(config),
            inner: RwLock::new(Inner {
                entries: BTreeMap::new(),
                next_membership: 1,
            }),
        }
    }

    /// A registry that starts out with `creator` admitted.
    pub fn with_creator(
        room_id: RoomId,
        config: &LivenessConfig,
        creator: ParticipantId,
        now: Instant,
    ) -> (Self, Participant) {
        let registry = Self::new(room_id, config);
        let participant = registry.inner.write().admit(creator, now);
        (registry, participant)
    }

    /// Admits `id` as an Active participant with a fresh membership.
    ///
    /// # Errors
    /// [`RoomError::AlreadyPresent`] if `id` is already in the room, in
    /// any liveness state.
    pub fn admit(&self, id: ParticipantId, now: Instant) -> Result<Participant, RoomError> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&id) {
            return Err(RoomError::AlreadyPresent {
                room_id: self.room_id,
                participant_id: id,
            });
        }
        let participant = inner.admit(id, now);
        info!(
            room_id = %self.room_id,
            participant_id = %participant.id,
            membership = %participant.membership,
            "participant admitted"
        );
        Ok(participant)
    }

    /// Removes `id`. The returned snapshot is marked Departed.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if `id` isn't in the room.
    pub fn remove(&self, id: &ParticipantId) -> Result<Participant, RoomError> {
        self.mark_departed(id).ok_or_else(|| RoomError::NotFound {
            room_id: self.room_id,
            participant_id: id.clone(),
        })
    }

    /// Active → Suspected. Returns `true` if the state changed.
    pub fn mark_suspected(&self, id: &ParticipantId, now: Instant) -> bool {
        let changed = self
            .inner
            .write()
            .entries
            .get_mut(id)
            .is_some_and(|entry| entry.heartbeat.suspect(now));
        if changed {
            debug!(room_id = %self.room_id, participant_id = %id, "participant suspected");
        }
        changed
    }

    /// Suspected → Active, the explicit recovery signal. Returns `true` if
    /// the state changed.
    pub fn mark_active(&self, id: &ParticipantId, now: Instant) -> bool {
        let changed = self
            .inner
            .write()
            .entries
            .get_mut(id)
            .is_some_and(|entry| entry.heartbeat.recover(now));
        if changed {
            debug!(room_id = %self.room_id, participant_id = %id, "participant recovered");
        }
        changed
    }

    /// Records a heartbeat from `id`. Returns `true` if the heartbeat
    /// recovered a Suspected participant. Unknown ids are ignored.
    pub fn record_heartbeat(&self, id: &ParticipantId, now: Instant) -> bool {
        let recovered = self
            .inner
            .write()
            .entries
            .get_mut(id)
            .is_some_and(|entry| entry.heartbeat.heard(now));
        if recovered {
            debug!(room_id = %self.room_id, participant_id = %id, "heartbeat recovered participant");
        }
        recovered
    }

    /// Anything → Departed, removing the participant. Returns the removed
    /// participant, or `None` if it was already gone.
    pub fn mark_departed(&self, id: &ParticipantId) -> Option<Participant> {
        let mut entry = self.inner.write().entries.remove(id)?;
        entry.heartbeat.depart();
        info!(room_id = %self.room_id, participant_id = %id, "participant removed");
        Some(entry.participant(id))
    }

    /// Applies the time-driven liveness policy at `now`.
    ///
    /// Each participant moves at most one step per sweep. Participants
    /// that depart are removed before this returns.
    pub fn sweep(&self, now: Instant) -> Vec<LivenessTransition> {
        let mut inner = self.inner.write();
        let mut transitions = Vec::new();

        for (id, entry) in inner.entries.iter_mut() {
            let from = entry.heartbeat.liveness();
            let Some(verdict) = self.policy.apply(&mut entry.heartbeat, now) else {
                continue;
            };
            let to = match verdict {
                Verdict::Suspect => Liveness::Suspected,
                Verdict::Depart => Liveness::Departed,
            };
            transitions.push(LivenessTransition {
                participant_id: id.clone(),
                membership: entry.membership,
                from,
                to,
            });
        }

        for transition in &transitions {
            if transition.to == Liveness::Departed {
                inner.entries.remove(&transition.participant_id);
            }
        }

        if !transitions.is_empty() {
            debug!(
                room_id = %self.room_id,
                transitions = transitions.len(),
                remaining = inner.entries.len(),
                "liveness sweep applied"
            );
        }
        transitions
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Participant> {
        self.inner.read().entries.get(id).map(|entry| entry.participant(id))
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.inner.read().entries.contains_key(id)
    }

    pub fn is_active(&self, id: &ParticipantId) -> bool {
        self.inner
            .read()
            .entries
            .get(id)
            .is_some_and(|entry| entry.heartbeat.liveness().is_active())
    }

    /// The membership of `id` if it is currently Active.
    pub fn active_membership(&self, id: &ParticipantId) -> Option<MembershipId> {
        self.inner
            .read()
            .entries
            .get(id)
            .filter(|entry| entry.heartbeat.liveness().is_active())
            .map(|entry| entry.membership)
    }

    /// Ids of every Active participant, ordered.
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|(_, entry)| entry.heartbeat.liveness().is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every participant, ordered by id, copied in one read.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(id, entry)| entry.participant(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn registry() -> ParticipantRegistry {
        ParticipantRegistry::new(
            RoomId(1),
            &LivenessConfig {
                heartbeat_interval: Duration::from_secs(1),
                missed_heartbeats: 2,
                departure_grace: Duration::from_secs(5),
                ..LivenessConfig::default()
            },
        )
    }

    #[test]
    fn test_admit_issues_fresh_memberships() {
        let reg = registry();
        let now = Instant::now();

        let a = reg.admit(pid("a"), now).unwrap();
        assert_eq!(a.liveness, Liveness::Active);
        assert_eq!(a.membership, MembershipId(1));

        reg.remove(&pid("a")).unwrap();
        let again = reg.admit(pid("a"), now).unwrap();
        assert_eq!(again.membership, MembershipId(2), "re-admission is a new membership");
    }

    #[test]
    fn test_admit_duplicate_is_already_present() {
        let reg = registry();
        let now = Instant::now();
        reg.admit(pid("a"), now).unwrap();
        reg.mark_suspected(&pid("a"), now);

        let err = reg.admit(pid("a"), now).unwrap_err();
        assert!(matches!(err, RoomError::AlreadyPresent { participant_id, .. } if participant_id == pid("a")));
    }

    #[test]
    fn test_remove_absent_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.remove(&pid("ghost")),
            Err(RoomError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_returns_departed_snapshot() {
        let reg = registry();
        reg.admit(pid("a"), Instant::now()).unwrap();
        let gone = reg.remove(&pid("a")).unwrap();
        assert_eq!(gone.liveness, Liveness::Departed);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let reg = registry();
        let now = Instant::now();
        reg.admit(pid("a"), now).unwrap();

        assert!(reg.mark_suspected(&pid("a"), now));
        assert!(!reg.mark_suspected(&pid("a"), now));
        assert!(reg.mark_active(&pid("a"), now));
        assert!(!reg.mark_active(&pid("a"), now));

        assert!(reg.mark_departed(&pid("a")).is_some());
        assert!(reg.mark_departed(&pid("a")).is_none());
        assert!(!reg.mark_suspected(&pid("a"), now), "departed is a no-op");
    }

    #[test]
    fn test_snapshot_ordered_by_id() {
        let reg = registry();
        let now = Instant::now();
        for id in ["p7", "p3", "p9"] {
            reg.admit(pid(id), now).unwrap();
        }
        let ids: Vec<_> = reg.snapshot().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![pid("p3"), pid("p7"), pid("p9")]);
    }

    #[test]
    fn test_active_membership_excludes_suspected() {
        let reg = registry();
        let now = Instant::now();
        let a = reg.admit(pid("a"), now).unwrap();
        assert_eq!(reg.active_membership(&pid("a")), Some(a.membership));

        reg.mark_suspected(&pid("a"), now);
        assert_eq!(reg.active_membership(&pid("a")), None);
        assert!(reg.active_ids().is_empty());
        assert!(reg.contains(&pid("a")));
    }

    #[test]
    fn test_sweep_suspects_then_removes() {
        let reg = registry();
        let t0 = Instant::now();
        reg.admit(pid("quiet"), t0).unwrap();
        reg.admit(pid("chatty"), t0).unwrap();

        let t2 = t0 + Duration::from_secs(2);
        reg.record_heartbeat(&pid("chatty"), t2);
        let first = reg.sweep(t2);
        assert_eq!(
            first,
            vec![LivenessTransition {
                participant_id: pid("quiet"),
                membership: MembershipId(1),
                from: Liveness::Active,
                to: Liveness::Suspected,
            }]
        );

        let t7 = t2 + Duration::from_secs(5);
        reg.record_heartbeat(&pid("chatty"), t7);
        let second = reg.sweep(t7);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].to, Liveness::Departed);
        assert!(!reg.contains(&pid("quiet")));
        assert!(reg.is_active(&pid("chatty")));
    }

    #[test]
    fn test_heartbeat_recovers_suspected() {
        let reg = registry();
        let now = Instant::now();
        reg.admit(pid("a"), now).unwrap();
        reg.mark_suspected(&pid("a"), now);

        assert!(reg.record_heartbeat(&pid("a"), now));
        assert!(reg.is_active(&pid("a")));
        assert!(!reg.record_heartbeat(&pid("ghost"), now));
    }
}
