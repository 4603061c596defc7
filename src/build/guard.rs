// ABOUTME: Recent-creation guard bridging the gap between creating a container build and seeing it in lists.
// ABOUTME: Reservation happens under a narrow lock so creation is single-writer per (scope, hash).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::model::{ContainerBuild, Resource};
use crate::types::{ContainerBuildId, ContentHash, SystemId};

type GuardKey = (SystemId, ContentHash);

/// Outcome of consulting the guard.
#[derive(Debug)]
pub enum Reservation {
    /// The caller reserved the slot and must create this record.
    Reserved(ContainerBuild),
    /// Another reconciliation created (or is creating) this record.
    Existing(ContainerBuild),
}

struct Entry {
    record: ContainerBuild,
    /// The store has accepted or returned the record at least once.
    confirmed: bool,
}

impl Entry {
    fn reserved(record: ContainerBuild) -> Self {
        Self {
            record,
            confirmed: false,
        }
    }
}

/// Map of (scope, hash) to the container build most recently created for it.
///
/// Entries are never evicted, so the map grows with the number of distinct
/// definitions built by this process.
#[derive(Default)]
pub struct RecentCreationGuard {
    entries: Mutex<HashMap<GuardKey, Entry>>,
}

impl RecentCreationGuard {
    /// Return the recent record for the key, or reserve it with `candidate()`.
    pub fn reserve(
        &self,
        scope: &SystemId,
        hash: &ContentHash,
        candidate: impl FnOnce() -> ContainerBuild,
    ) -> Reservation {
        let mut entries = self.entries.lock();
        let key = (scope.clone(), hash.clone());
        if let Some(existing) = entries.get(&key) {
            return Reservation::Existing(existing.record.clone());
        }
        let reserved = candidate();
        entries.insert(key, Entry::reserved(reserved.clone()));
        Reservation::Reserved(reserved)
    }

    /// Replace the entry if it still points at `stale` (a record that failed
    /// or disappeared); otherwise return whatever replaced it in the meantime.
    pub fn replace_stale(
        &self,
        scope: &SystemId,
        hash: &ContentHash,
        stale: &ContainerBuildId,
        candidate: impl FnOnce() -> ContainerBuild,
    ) -> Reservation {
        let mut entries = self.entries.lock();
        let key = (scope.clone(), hash.clone());
        match entries.get(&key) {
            Some(current) if current.record.id() != stale => {
                Reservation::Existing(current.record.clone())
            }
            _ => {
                let reserved = candidate();
                entries.insert(key, Entry::reserved(reserved.clone()));
                Reservation::Reserved(reserved)
            }
        }
    }

    /// Mark the entry as seen in the store, if it still points at `id`.
    pub fn confirm(&self, scope: &SystemId, hash: &ContentHash, id: &ContainerBuildId) {
        let mut entries = self.entries.lock();
        let key = (scope.clone(), hash.clone());
        if let Some(entry) = entries.get_mut(&key)
            && entry.record.id() == id
        {
            entry.confirmed = true;
        }
    }

    /// Whether the entry for the key is `id` and the store has already shown it.
    ///
    /// A confirmed record that the store no longer returns was deleted, not
    /// merely slow to appear.
    pub fn is_confirmed(&self, scope: &SystemId, hash: &ContentHash, id: &ContainerBuildId) -> bool {
        let entries = self.entries.lock();
        let key = (scope.clone(), hash.clone());
        entries
            .get(&key)
            .is_some_and(|entry| entry.confirmed && entry.record.id() == id)
    }

    /// Drop a reservation whose creation failed, unless it was already replaced.
    pub fn withdraw(&self, scope: &SystemId, hash: &ContentHash, id: &ContainerBuildId) {
        let mut entries = self.entries.lock();
        let key = (scope.clone(), hash.clone());
        if entries.get(&key).is_some_and(|current| current.record.id() == id) {
            entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
