// ABOUTME: Explicit adjacency indices used to fan out notifications to dependents.
// ABOUTME: ContainerBuild -> Builds, Build -> Deploys and System -> Deploys/Teardowns.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{BuildId, ContainerBuildId, DeployId, SystemId, TeardownId};

/// Many-to-many index from a referenced key to the values that depend on it.
///
/// Edges are only added while a value exists and dropped when the value is
/// removed. A stale edge costs one spurious enqueue and nothing else.
pub struct ReferenceIndex<K, V> {
    inner: RwLock<IndexMaps<K, V>>,
}

struct IndexMaps<K, V> {
    dependents: HashMap<K, HashSet<V>>,
    references: HashMap<V, HashSet<K>>,
}

impl<K, V> Default for ReferenceIndex<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(IndexMaps {
                dependents: HashMap::new(),
                references: HashMap::new(),
            }),
        }
    }
}

impl<K, V> ReferenceIndex<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    /// Record that `value` depends on `key`.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write();
        inner
            .dependents
            .entry(key.clone())
            .or_default()
            .insert(value.clone());
        inner.references.entry(value).or_default().insert(key);
    }

    /// Record that `value` depends on every key in `keys`.
    pub fn insert_all<'a>(&self, keys: impl IntoIterator<Item = &'a K>, value: &V)
    where
        K: 'a,
    {
        for key in keys {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Drop every edge from `value`.
    pub fn remove_value(&self, value: &V) {
        let mut inner = self.inner.write();
        let Some(keys) = inner.references.remove(value) else {
            return;
        };
        for key in keys {
            if let Some(values) = inner.dependents.get_mut(&key) {
                values.remove(value);
                if values.is_empty() {
                    inner.dependents.remove(&key);
                }
            }
        }
    }

    /// Values depending on `key`.
    pub fn dependents(&self, key: &K) -> Vec<V> {
        self.inner
            .read()
            .dependents
            .get(key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.inner
            .read()
            .dependents
            .get(key)
            .is_some_and(|values| values.contains(value))
    }
}

/// All indices the event router maintains.
#[derive(Default)]
pub struct Indices {
    /// Builds to re-enqueue when a container build changes. Shared with the
    /// container build cache, which records edges as it resolves.
    pub builds_by_container_build: Arc<ReferenceIndex<ContainerBuildId, BuildId>>,
    /// Deploys waiting on a build.
    pub deploys_by_build: ReferenceIndex<BuildId, DeployId>,
    /// Deploys to re-evaluate when their system changes (claim release, rollout progress).
    pub deploys_by_system: ReferenceIndex<SystemId, DeployId>,
    /// Teardowns to re-evaluate when their system changes.
    pub teardowns_by_system: ReferenceIndex<SystemId, TeardownId>,
}
