//! Room attributes: string keys mapped to opaque values.
//!
//! Every key carries a version counter that goes up by one on every write
//! (including removal). Writers that care about conflicts read the
//! version first and write with [`AttributeStore::set_if_version`];
//! everyone else just calls [`AttributeStore::set`] and the merge policy
//! decides, last writer wins by default.
//!
//! There is no cross-key atomicity. Two keys written at the same time by
//! different callers may interleave in any order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use huddle_types::AttributeValue;
use parking_lot::RwLock;
use tracing::trace;

/// Decides what is stored when a value is written over an existing one.
pub trait MergePolicy: Send + Sync + 'static {
    fn merge(
        &self,
        key: &str,
        current: Option<&AttributeValue>,
        incoming: AttributeValue,
    ) -> AttributeValue;
}

/// The default policy: the incoming value replaces the current one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl MergePolicy for LastWriterWins {
    fn merge(
        &self,
        _key: &str,
        _current: Option<&AttributeValue>,
        incoming: AttributeValue,
    ) -> AttributeValue {
        incoming
    }
}

/// An optimistic write lost the race.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("attribute {key:?} is at version {actual}, expected {expected}")]
pub struct AttributeConflict {
    pub key: String,
    pub expected: u64,
    pub actual: u64,
}

#[derive(Debug, Default)]
struct Slot {
    value: Option<AttributeValue>,
    version: u64,
}

/// The attribute map of one room.
pub struct AttributeStore {
    slots: RwLock<HashMap<String, Slot>>,
    policy: Box<dyn MergePolicy>,
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeStore")
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl AttributeStore {
    /// An empty store with last-writer-wins semantics.
    pub fn new() -> Self {
        Self::with_policy(LastWriterWins)
    }

    pub fn with_policy(policy: impl MergePolicy) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            policy: Box::new(policy),
        }
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.slots.read().get(key).and_then(|slot| slot.value.clone())
    }

    /// The value and its version, read together.
    pub fn get_versioned(&self, key: &str) -> Option<(AttributeValue, u64)> {
        let slots = self.slots.read();
        let slot = slots.get(key)?;
        slot.value.clone().map(|value| (value, slot.version))
    }

    /// The key's version counter. 0 means never written.
    pub fn version(&self, key: &str) -> u64 {
        self.slots.read().get(key).map_or(0, |slot| slot.version)
    }

    /// Writes `value` under `key` and returns the key's new version.
    pub fn set(&self, key: impl Into<String>, value: AttributeValue) -> u64 {
        let key = key.into();
        let mut slots = self.slots.write();
        let slot = slots.entry(key.clone()).or_default();
        let merged = self.policy.merge(&key, slot.value.as_ref(), value);
        slot.value = Some(merged);
        slot.version += 1;
        trace!(%key, version = slot.version, "attribute set");
        slot.version
    }

    /// Writes `value` only if the key is still at `expected` (0 for a key
    /// that was never written).
    ///
    /// # Errors
    /// [`AttributeConflict`] with the version actually found.
    pub fn set_if_version(
        &self,
        key: impl Into<String>,
        value: AttributeValue,
        expected: u64,
    ) -> Result<u64, AttributeConflict> {
        let key = key.into();
        let mut slots = self.slots.write();
        let actual = slots.get(&key).map_or(0, |slot| slot.version);
        if actual != expected {
            return Err(AttributeConflict {
                key,
                expected,
                actual,
            });
        }
        let slot = slots.entry(key.clone()).or_default();
        let merged = self.policy.merge(&key, slot.value.as_ref(), value);
        slot.value = Some(merged);
        slot.version += 1;
        trace!(%key, version = slot.version, "attribute set at expected version");
        Ok(slot.version)
    }

    /// Removes the value under `key`. The version still advances, so a
    /// later writer sees a higher counter than anything it read before.
    /// Returns the new version, or `None` if there was no value.
    pub fn remove(&self, key: &str) -> Option<u64> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(key)?;
        slot.value.take()?;
        slot.version += 1;
        trace!(%key, version = slot.version, "attribute removed");
        Some(slot.version)
    }

    /// Every present key and its value, copied in one read.
    pub fn snapshot_all(&self) -> BTreeMap<String, AttributeValue> {
        self.slots
            .read()
            .iter()
            .filter_map(|(key, slot)| {
                slot.value.clone().map(|value| (key.clone(), value))
            })
            .collect()
    }

    /// Number of keys with a value.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
