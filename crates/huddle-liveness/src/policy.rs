//! Per-participant heartbeat evidence and the time-driven liveness rule.

use std::time::Duration;

use huddle_types::Liveness;
use tokio::time::Instant;

use crate::LivenessConfig;

/// What a sweep decided about one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Silent for too long: Active → Suspected.
    Suspect,
    /// Suspected for longer than the grace period: Suspected → Departed.
    Depart,
}

/// Liveness evidence for one participant.
///
/// Records when we last heard from the participant and, if it is
/// suspected, since when. Transitions are idempotent: each method returns
/// `true` only when it actually changed the state.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    liveness: Liveness,
    last_heard: Instant,
    suspected_since: Option<Instant>,
}

impl HeartbeatRecord {
    /// A fresh, Active record heard from at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            liveness: Liveness::Active,
            last_heard: now,
            suspected_since: None,
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn last_heard(&self) -> Instant {
        self.last_heard
    }

    pub fn suspected_since(&self) -> Option<Instant> {
        self.suspected_since
    }

    /// Records a heartbeat. A heartbeat is an explicit liveness signal, so
    /// it also recovers a Suspected participant. Returns `true` on recovery.
    pub fn heard(&mut self, now: Instant) -> bool {
        if self.liveness == Liveness::Departed {
            return false;
        }
        self.last_heard = now;
        self.recover(now)
    }

    /// Suspected → Active. Returns `true` if the state changed.
    pub fn recover(&mut self, now: Instant) -> bool {
        if self.liveness != Liveness::Suspected {
            return false;
        }
        self.liveness = Liveness::Active;
        self.last_heard = now;
        self.suspected_since = None;
        true
    }

    /// Active → Suspected. Returns `true` if the state changed.
    pub fn suspect(&mut self, now: Instant) -> bool {
        if self.liveness != Liveness::Active {
            return false;
        }
        self.liveness = Liveness::Suspected;
        self.suspected_since = Some(now);
        true
    }

    /// Anything → Departed. Returns `true` if the state changed.
    pub fn depart(&mut self) -> bool {
        if self.liveness == Liveness::Departed {
            return false;
        }
        self.liveness = Liveness::Departed;
        self.suspected_since = None;
        true
    }
}

/// The time-driven half of the liveness state machine.
#[derive(Debug, Clone, Copy)]
pub struct LivenessPolicy {
    suspect_after: Duration,
    departure_grace: Duration,
}

impl LivenessPolicy {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            suspect_after: config.suspect_after(),
            departure_grace: config.departure_grace,
        }
    }

    /// Decides whether `record` should transition at `now`.
    ///
    /// Moves at most one step per call: an Active participant that has been
    /// silent long enough is suspected, and only a later evaluation can
    /// make it depart. Elapsed time never produces a recovery.
    pub fn evaluate(&self, record: &HeartbeatRecord, now: Instant) -> Option<Verdict> {
        match record.liveness {
            Liveness::Active => {
                let silent = now.saturating_duration_since(record.last_heard);
                (silent >= self.suspect_after).then_some(Verdict::Suspect)
            }
            Liveness::Suspected => {
                let since = record.suspected_since.unwrap_or(record.last_heard);
                let suspected_for = now.saturating_duration_since(since);
                (suspected_for >= self.departure_grace).then_some(Verdict::Depart)
            }
            Liveness::Departed => None,
        }
    }

    /// Evaluates and applies the verdict to `record`.
    pub fn apply(&self, record: &mut HeartbeatRecord, now: Instant) -> Option<Verdict> {
        let verdict = self.evaluate(record, now)?;
        match verdict {
            Verdict::Suspect => record.suspect(now),
            Verdict::Depart => record.depart(),
        };
        Some(verdict)
    }
}
