// ABOUTME: In-memory store implementation for tests and simulations.
// ABOUTME: Thread-safe, versioned, with broadcast watch streams per kind.

//! ## Limitations
//!
//! - No durability: all state is lost when the process exits
//! - Single process only
//! - Watch subscribers that fall behind by more than the buffer size observe
//!   `RecvError::Lagged` and must re-list

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::{Collection, Result, Store, StoreError, WatchEvent};
use crate::model::{
    Build, ContainerBuild, Deploy, LabelSelector, Resource, System, Teardown,
};
use crate::types::Id;

/// Default capacity of each kind's watch buffer.
pub const DEFAULT_WATCH_BUFFER: usize = 1024;

/// Records of one kind.
pub struct MemoryCollection<R: Resource> {
    records: RwLock<BTreeMap<String, R>>,
    next_version: AtomicU64,
    events: broadcast::Sender<WatchEvent<R>>,
}

impl<R: Resource> MemoryCollection<R> {
    pub fn new(watch_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(watch_buffer.max(1));
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_version: AtomicU64::new(1),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn publish(&self, event: WatchEvent<R>) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl<R: Resource> Collection<R> for MemoryCollection<R> {
    async fn get(&self, id: &Id<R::Marker>) -> Result<Option<R>> {
        Ok(self.records.read().get(id.as_str()).cloned())
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<R>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| selector.matches(&r.meta().labels))
            .cloned()
            .collect())
    }

    async fn create(&self, mut resource: R) -> Result<R> {
        let stored = {
            let mut records = self.records.write();
            let key = resource.id().to_string();
            if records.contains_key(&key) {
                return Err(StoreError::AlreadyExists {
                    kind: R::KIND,
                    id: key,
                });
            }

            let meta = resource.meta_mut();
            meta.resource_version = self.bump();
            meta.generation = 1;
            meta.created_at = Utc::now();

            records.insert(key, resource.clone());
            resource
        };

        self.publish(WatchEvent::Added(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, mut resource: R) -> Result<R> {
        let stored = {
            let mut records = self.records.write();
            let key = resource.id().to_string();
            let Some(current) = records.get(&key) else {
                return Err(StoreError::NotFound {
                    kind: R::KIND,
                    id: key,
                });
            };

            let expected = resource.meta().resource_version;
            let actual = current.meta().resource_version;
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: R::KIND,
                    id: key,
                    expected,
                    actual,
                });
            }

            let generation = if resource.spec_differs(current) {
                current.meta().generation + 1
            } else {
                current.meta().generation
            };
            let created_at = current.meta().created_at;

            let meta = resource.meta_mut();
            meta.resource_version = self.bump();
            meta.generation = generation;
            meta.created_at = created_at;

            records.insert(key, resource.clone());
            resource
        };

        self.publish(WatchEvent::Modified(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, id: &Id<R::Marker>) -> Result<()> {
        let removed = self.records.write().remove(id.as_str());
        match removed {
            Some(record) => {
                self.publish(WatchEvent::Deleted(record));
                Ok(())
            }
            None => Err(StoreError::not_found(R::KIND, id)),
        }
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<R>> {
        self.events.subscribe()
    }
}

/// In-memory store holding every record kind.
pub struct MemoryStore {
    container_builds: MemoryCollection<ContainerBuild>,
    builds: MemoryCollection<Build>,
    systems: MemoryCollection<System>,
    deploys: MemoryCollection<Deploy>,
    teardowns: MemoryCollection<Teardown>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_watch_buffer(DEFAULT_WATCH_BUFFER)
    }

    pub fn with_watch_buffer(watch_buffer: usize) -> Self {
        Self {
            container_builds: MemoryCollection::new(watch_buffer),
            builds: MemoryCollection::new(watch_buffer),
            systems: MemoryCollection::new(watch_buffer),
            deploys: MemoryCollection::new(watch_buffer),
            teardowns: MemoryCollection::new(watch_buffer),
        }
    }

    /// Number of container builds stored, for dedup assertions.
    pub fn container_build_count(&self) -> usize {
        self.container_builds.len()
    }
}

impl Store for MemoryStore {
    fn container_builds(&self) -> &dyn Collection<ContainerBuild> {
        &self.container_builds
    }

    fn builds(&self) -> &dyn Collection<Build> {
        &self.builds
    }

    fn systems(&self) -> &dyn Collection<System> {
        &self.systems
    }

    fn deploys(&self) -> &dyn Collection<Deploy> {
        &self.deploys
    }

    fn teardowns(&self) -> &dyn Collection<Teardown> {
        &self.teardowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServiceState, ServiceStatus};
    use crate::types::{ServicePath, SystemId};

    #[tokio::test]
    async fn create_assigns_version_and_generation() {
        let store = MemoryStore::new();
        let created = store
            .systems()
            .create(System::new(SystemId::new("petstore")))
            .await
            .unwrap();

        assert_eq!(created.meta.generation, 1);
        assert!(created.meta.resource_version > 0);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryStore::new();
        let system = System::new(SystemId::new("petstore"));
        store.systems().create(system.clone()).await.unwrap();

        let err = store.systems().create(system).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = MemoryStore::new();
        let created = store
            .systems()
            .create(System::new(SystemId::new("petstore")))
            .await
            .unwrap();

        let mut first = created.clone();
        first.status.observed_generation = 1;
        store.systems().update(first).await.unwrap();

        let mut stale = created;
        stale.status.observed_generation = 2;
        let err = store.systems().update(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn generation_bumps_only_on_spec_change() {
        let store = MemoryStore::new();
        let created = store
            .systems()
            .create(System::new(SystemId::new("petstore")))
            .await
            .unwrap();

        let mut status_only = created.clone();
        status_only.status.services.insert(
            ServicePath::new("/api").unwrap(),
            ServiceStatus::new(ServiceState::Stable, 1),
        );
        let after_status = store.systems().update(status_only).await.unwrap();
        assert_eq!(after_status.meta.generation, 1);
        assert!(after_status.meta.resource_version > created.meta.resource_version);

        let mut spec_change = after_status;
        spec_change.spec.version = Some(crate::types::Version::new("v2").unwrap());
        let after_spec = store.systems().update(spec_change).await.unwrap();
        assert_eq!(after_spec.meta.generation, 2);
    }

    #[tokio::test]
    async fn watch_observes_writes() {
        let store = MemoryStore::new();
        let mut events = store.systems().watch();

        let created = store
            .systems()
            .create(System::new(SystemId::new("petstore")))
            .await
            .unwrap();
        store.systems().delete(created.id()).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), WatchEvent::Added(_)));
        assert!(matches!(events.recv().await.unwrap(), WatchEvent::Deleted(_)));
    }

    #[tokio::test]
    async fn list_filters_by_label() {
        let store = MemoryStore::new();
        let mut tagged = System::new(SystemId::new("a"));
        tagged.meta.labels.insert("team".into(), "web".into());
        store.systems().create(tagged).await.unwrap();
        store
            .systems()
            .create(System::new(SystemId::new("b")))
            .await
            .unwrap();

        let selected = store
            .systems()
            .list(&LabelSelector::default().with("team", "web"))
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].meta.id.as_str(), "a");
    }
}
