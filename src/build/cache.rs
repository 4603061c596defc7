// ABOUTME: Finds or creates the ContainerBuild for every container a Build declares.
// ABOUTME: Dedups by (scope, content hash) and records which Builds depend on which ContainerBuilds.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::guard::{RecentCreationGuard, Reservation};
use crate::controller::error::Result;
use crate::controller::index::ReferenceIndex;
use crate::model::{
    labels, Build, ContainerBuild, ContainerBuildDefinition, ContainerBuildRefs, LabelSelector,
    OwnerRef, Resource, ResourceKind, WorkloadBuildSpec,
};
use crate::store::Store;
use crate::types::{BuildId, ContainerBuildId, ContentHash, HashWidth, ServicePath, SystemId};

/// Container builds resolved for one Build in one pass.
#[derive(Debug, Default)]
pub struct ResolvedContainers {
    pub services: BTreeMap<ServicePath, ContainerBuildRefs>,
    pub jobs: BTreeMap<ServicePath, ContainerBuildRefs>,
    pub container_builds: BTreeMap<ContainerBuildId, ContainerBuild>,
}

/// Per-pass memo so identical containers inside one Build share a lookup.
type PassMap = HashMap<ContentHash, ContainerBuild>;

pub struct ContainerBuildCache {
    store: Arc<dyn Store>,
    guard: RecentCreationGuard,
    dependents: Arc<ReferenceIndex<ContainerBuildId, BuildId>>,
    hash_width: HashWidth,
}

impl ContainerBuildCache {
    pub fn new(
        store: Arc<dyn Store>,
        dependents: Arc<ReferenceIndex<ContainerBuildId, BuildId>>,
        hash_width: HashWidth,
    ) -> Self {
        Self {
            store,
            guard: RecentCreationGuard::default(),
            dependents,
            hash_width,
        }
    }

    /// Entries held by the recent-creation guard.
    pub fn guard_len(&self) -> usize {
        self.guard.len()
    }

    /// Resolve every service and job container of `build`.
    ///
    /// Containers already mapped in the Build's status keep their mapping as
    /// long as the referenced record exists and was built from the current
    /// definition.
    pub async fn resolve(&self, build: &Build) -> Result<ResolvedContainers> {
        let mut pass = PassMap::new();
        let mut resolved = ResolvedContainers::default();

        for (path, service) in &build.spec.services {
            let current = build.status.services.get(path);
            let refs = self
                .resolve_workload(build, &service.containers, current, &mut pass, &mut resolved)
                .await?;
            resolved.services.insert(path.clone(), refs);
        }
        for (path, job) in &build.spec.jobs {
            let current = build.status.jobs.get(path);
            let refs = self
                .resolve_workload(build, job, current, &mut pass, &mut resolved)
                .await?;
            resolved.jobs.insert(path.clone(), refs);
        }

        tracing::debug!(
            build = %build.meta.id,
            container_builds = resolved.container_builds.len(),
            guard_entries = self.guard.len(),
            "resolved container builds"
        );
        Ok(resolved)
    }

    async fn resolve_workload(
        &self,
        build: &Build,
        workload: &WorkloadBuildSpec,
        current: Option<&ContainerBuildRefs>,
        pass: &mut PassMap,
        resolved: &mut ResolvedContainers,
    ) -> Result<ContainerBuildRefs> {
        let main = self
            .resolve_container(build, &workload.main, current.map(|c| &c.main), pass)
            .await?;
        let main_id = main.meta.id.clone();
        resolved.container_builds.insert(main_id.clone(), main);

        let mut sidecars = BTreeMap::new();
        for (name, definition) in &workload.sidecars {
            let mapped = current.and_then(|c| c.sidecars.get(name));
            let sidecar = self.resolve_container(build, definition, mapped, pass).await?;
            sidecars.insert(name.clone(), sidecar.meta.id.clone());
            resolved
                .container_builds
                .insert(sidecar.meta.id.clone(), sidecar);
        }

        Ok(ContainerBuildRefs {
            main: main_id,
            sidecars,
        })
    }

    async fn resolve_container(
        &self,
        build: &Build,
        definition: &ContainerBuildDefinition,
        mapped: Option<&ContainerBuildId>,
        pass: &mut PassMap,
    ) -> Result<ContainerBuild> {
        let hash = ContentHash::compute(definition, self.hash_width)?;

        if let Some(id) = mapped {
            match self.store.container_builds().get(id).await? {
                Some(existing) if existing.content_hash() == Some(hash.as_str()) => {
                    self.track(existing.id(), build.id());
                    pass.entry(hash).or_insert_with(|| existing.clone());
                    return Ok(existing);
                }
                Some(_) => {
                    tracing::debug!(build = %build.meta.id, container_build = %id, hash = %hash, "container definition changed, resolving again");
                }
                None => {
                    tracing::debug!(build = %build.meta.id, container_build = %id, "mapped container build is gone, resolving again");
                }
            }
        }

        if let Some(seen) = pass.get(&hash) {
            return Ok(seen.clone());
        }

        let scope = &build.spec.system;
        let container_build = match self.find_existing(scope, &hash).await? {
            Some(existing) => existing,
            None => self.create_or_join(build, definition, &hash).await?,
        };

        self.track(container_build.id(), build.id());
        pass.insert(hash, container_build.clone());
        Ok(container_build)
    }

    /// Oldest non-failed ContainerBuild with this hash in this scope.
    async fn find_existing(
        &self,
        scope: &SystemId,
        hash: &ContentHash,
    ) -> Result<Option<ContainerBuild>> {
        let selector = LabelSelector::default()
            .with(labels::DEFINITION_HASH, hash.as_str())
            .with(labels::SCOPE, scope.as_str());
        let mut candidates: Vec<_> = self
            .store
            .container_builds()
            .list(&selector)
            .await?
            .into_iter()
            .filter(|cb| !cb.is_failed())
            .collect();
        candidates.sort_by(|a, b| {
            a.meta
                .created_at
                .cmp(&b.meta.created_at)
                .then_with(|| a.meta.id.cmp(&b.meta.id))
        });
        Ok(candidates.into_iter().next())
    }

    async fn create_or_join(
        &self,
        build: &Build,
        definition: &ContainerBuildDefinition,
        hash: &ContentHash,
    ) -> Result<ContainerBuild> {
        let scope = &build.spec.system;
        let candidate = || {
            ContainerBuild::new(
                ContainerBuildId::generate(),
                definition.clone(),
                hash,
                scope,
                OwnerRef::new(ResourceKind::Build, build.id()),
            )
        };

        let recent = match self.guard.reserve(scope, hash, candidate) {
            Reservation::Reserved(reserved) => return self.create(scope, hash, reserved).await,
            Reservation::Existing(recent) => recent,
        };

        match self.store.container_builds().get(recent.id()).await? {
            Some(current) if current.is_failed() => {
                self.replace_stale(scope, hash, current.id(), candidate).await
            }
            Some(current) => {
                self.guard.confirm(scope, hash, current.id());
                Ok(current)
            }
            None if self.guard.is_confirmed(scope, hash, recent.id()) => {
                tracing::debug!(container_build = %recent.meta.id, scope = %scope, hash = %hash, "recently created container build is gone, replacing");
                self.replace_stale(scope, hash, recent.id(), candidate).await
            }
            // Created by another reconciliation but not visible yet.
            None => Ok(recent),
        }
    }

    async fn replace_stale(
        &self,
        scope: &SystemId,
        hash: &ContentHash,
        stale: &ContainerBuildId,
        candidate: impl FnOnce() -> ContainerBuild,
    ) -> Result<ContainerBuild> {
        match self.guard.replace_stale(scope, hash, stale, candidate) {
            Reservation::Reserved(reserved) => self.create(scope, hash, reserved).await,
            Reservation::Existing(other) => Ok(other),
        }
    }

    async fn create(
        &self,
        scope: &SystemId,
        hash: &ContentHash,
        reserved: ContainerBuild,
    ) -> Result<ContainerBuild> {
        let id = reserved.meta.id.clone();
        match self.store.container_builds().create(reserved).await {
            Ok(created) => {
                self.guard.confirm(scope, hash, &id);
                tracing::info!(container_build = %id, scope = %scope, hash = %hash, "created container build");
                Ok(created)
            }
            Err(err) => {
                self.guard.withdraw(scope, hash, &id);
                Err(err.into())
            }
        }
    }

    fn track(&self, container_build: &ContainerBuildId, build: &BuildId) {
        self.dependents.insert(container_build.clone(), build.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildSpec, ContainerBuildState, ServiceBuildSpec};
    use crate::store::MemoryStore;
    use crate::types::BuildId;

    fn path(p: &str) -> ServicePath {
        ServicePath::new(p).unwrap()
    }

    fn build_with(id: &str, services: &[(&str, ContainerBuildDefinition)]) -> Build {
        let services = services
            .iter()
            .map(|(p, def)| {
                (
                    path(p),
                    ServiceBuildSpec {
                        instances: 1,
                        containers: WorkloadBuildSpec::new(def.clone()),
                    },
                )
            })
            .collect();
        Build::new(
            BuildId::new(id),
            BuildSpec {
                system: SystemId::new("petstore"),
                version: None,
                services,
                jobs: BTreeMap::new(),
            },
        )
    }

    fn cache(store: &Arc<MemoryStore>) -> ContainerBuildCache {
        ContainerBuildCache::new(
            Arc::clone(store) as Arc<dyn Store>,
            Arc::new(ReferenceIndex::default()),
            HashWidth::default(),
        )
    }

    #[tokio::test]
    async fn identical_containers_in_one_build_share_a_record() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store);
        let def = ContainerBuildDefinition::git("https://example.com/api.git", "c1");
        let build = build_with("b1", &[("/petstore/api", def.clone()), ("/petstore/worker", def)]);

        let resolved = cache.resolve(&build).await.unwrap();

        assert_eq!(resolved.container_builds.len(), 1);
        assert_eq!(
            resolved.services[&path("/petstore/api")].main,
            resolved.services[&path("/petstore/worker")].main
        );
        assert_eq!(store.container_build_count(), 1);
    }

    #[tokio::test]
    async fn later_build_reuses_existing_record_and_is_indexed() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store);
        let def = ContainerBuildDefinition::git("https://example.com/api.git", "c1");

        let first = cache
            .resolve(&build_with("b1", &[("/petstore/api", def.clone())]))
            .await
            .unwrap();
        let second = cache
            .resolve(&build_with("b2", &[("/petstore/api", def)]))
            .await
            .unwrap();

        let cb = &first.services[&path("/petstore/api")].main;
        assert_eq!(&second.services[&path("/petstore/api")].main, cb);
        assert_eq!(store.container_build_count(), 1);

        let mut dependents = cache.dependents.dependents(cb);
        dependents.sort();
        assert_eq!(dependents, vec![BuildId::new("b1"), BuildId::new("b2")]);
    }

    #[tokio::test]
    async fn failed_record_is_never_reused() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store);
        let def = ContainerBuildDefinition::git("https://example.com/api.git", "c1");

        let first = cache
            .resolve(&build_with("b1", &[("/petstore/api", def.clone())]))
            .await
            .unwrap();
        let failed_id = first.services[&path("/petstore/api")].main.clone();
        let mut failed = store.container_builds().get(&failed_id).await.unwrap().unwrap();
        failed.status.state = ContainerBuildState::Failed;
        store.container_builds().update(failed).await.unwrap();

        let second = cache
            .resolve(&build_with("b2", &[("/petstore/api", def)]))
            .await
            .unwrap();

        assert_ne!(second.services[&path("/petstore/api")].main, failed_id);
        assert_eq!(store.container_build_count(), 2);
    }

    #[tokio::test]
    async fn dedup_is_scoped_per_system() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store);
        let def = ContainerBuildDefinition::git("https://example.com/api.git", "c1");

        cache
            .resolve(&build_with("b1", &[("/petstore/api", def.clone())]))
            .await
            .unwrap();
        let mut other = build_with("b2", &[("/petstore/api", def)]);
        other.spec.system = SystemId::new("bookshop");
        cache.resolve(&other).await.unwrap();

        assert_eq!(store.container_build_count(), 2);
    }

    #[tokio::test]
    async fn mapped_but_missing_container_is_resolved_again() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store);
        let def = ContainerBuildDefinition::git("https://example.com/api.git", "c1");
        let mut build = build_with("b1", &[("/petstore/api", def)]);
        build.status.services.insert(
            path("/petstore/api"),
            ContainerBuildRefs {
                main: ContainerBuildId::new("vanished"),
                sidecars: BTreeMap::new(),
            },
        );

        let resolved = cache.resolve(&build).await.unwrap();

        assert_ne!(
            resolved.services[&path("/petstore/api")].main,
            ContainerBuildId::new("vanished")
        );
        assert_eq!(store.container_build_count(), 1);
    }
}
