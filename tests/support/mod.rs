// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup, store fixtures and a polling helper for controller tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use keel::model::{
    BuildSpec, ContainerArtifact, ContainerBuildDefinition, ContainerBuildState, LabelSelector,
    ServiceBuildSpec, System, WorkloadBuildSpec,
};
use keel::store::{MemoryStore, Store};
use keel::types::{ServicePath, SystemId, Version};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("keel=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[allow(dead_code)]
pub fn path(p: &str) -> ServicePath {
    ServicePath::new(p).unwrap()
}

#[allow(dead_code)]
pub fn version(v: &str) -> Version {
    Version::new(v).unwrap()
}

/// Store with the given systems already created.
#[allow(dead_code)]
pub async fn store_with_systems(systems: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for id in systems {
        store.systems().create(System::new(SystemId::new(*id))).await.unwrap();
    }
    store
}

/// Build spec with one service per `(path, commit)` pair, all from the same repository.
#[allow(dead_code)]
pub fn build_spec(system: &str, services: &[(&str, &str)]) -> BuildSpec {
    BuildSpec {
        system: SystemId::new(system),
        version: None,
        services: services
            .iter()
            .map(|(p, commit)| {
                (
                    path(p),
                    ServiceBuildSpec {
                        instances: 1,
                        containers: WorkloadBuildSpec::new(ContainerBuildDefinition::git(
                            "https://example.com/app.git",
                            *commit,
                        )),
                    },
                )
            })
            .collect(),
        jobs: BTreeMap::new(),
    }
}

/// Mark every container build in the store as finished.
#[allow(dead_code)]
pub async fn finish_container_builds(store: &MemoryStore, state: ContainerBuildState) {
    let builds = store
        .container_builds()
        .list(&LabelSelector::everything())
        .await
        .unwrap();
    for mut cb in builds {
        cb.status.state = state;
        if state == ContainerBuildState::Succeeded {
            cb.status.artifact = Some(ContainerArtifact {
                image: format!("registry.local/{}", cb.meta.id),
            });
        }
        store.container_builds().update(cb).await.unwrap();
    }
}

/// Poll `check` until it returns true or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
