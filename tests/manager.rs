// ABOUTME: End-to-end tests running every controller through the ControllerManager.
// ABOUTME: The simulated builder and rollout play the external systems.

mod support;

use std::sync::Arc;
use std::time::Duration;

use keel::config::Config;
use keel::controller::ControllerManager;
use keel::diagnostics::Diagnostics;
use keel::model::{Deploy, DeployState, Teardown, TeardownState};
use keel::resolver::{StaticDefinitions, SystemDefinition};
use keel::sim::{FakeBuilder, FakeRollout};
use keel::store::{MemoryStore, Store};
use keel::types::{DeployId, SystemId, TeardownId};
use support::{eventually, init_tracing, store_with_systems, version};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_millis(10);
const SETTLE: Duration = Duration::from_secs(10);

struct Running {
    store: Arc<MemoryStore>,
    manager: Arc<ControllerManager>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    async fn start(store: Arc<MemoryStore>, resolver: Arc<StaticDefinitions>) -> Self {
        init_tracing();
        let dyn_store = Arc::clone(&store) as Arc<dyn Store>;
        let manager = Arc::new(ControllerManager::new(
            Arc::clone(&dyn_store),
            resolver,
            Config::default(),
            Arc::new(Diagnostics::default()),
        ));
        let (stop, stop_rx) = watch::channel(false);

        let run = {
            let manager = Arc::clone(&manager);
            let stop_rx = stop_rx.clone();
            tokio::spawn(async move {
                manager.run(stop_rx).await.unwrap();
            })
        };
        let builder = tokio::spawn(FakeBuilder::new(Arc::clone(&dyn_store)).run(stop_rx.clone(), TICK));
        let rollout = tokio::spawn(FakeRollout::new(dyn_store).run(stop_rx, TICK));

        Self {
            store,
            manager,
            stop,
            tasks: vec![run, builder, rollout],
        }
    }

    async fn deploy_state(&self, id: &str) -> Option<DeployState> {
        self.store
            .deploys()
            .get(&DeployId::new(id))
            .await
            .unwrap()
            .map(|d| d.status.state)
    }

    async fn shutdown(self) {
        self.stop.send(true).unwrap();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

fn petstore_v1() -> SystemDefinition {
    serde_yaml::from_str(
        r#"
services:
  /petstore/api:
    instances: 2
    main:
      source:
        git: { url: "https://example.com/api.git", commit: a1 }
    sidecars:
      proxy:
        source:
          image: { reference: "envoyproxy/envoy:v1.30" }
  /petstore/web:
    main:
      source:
        git: { url: "https://example.com/api.git", commit: a1 }
jobs:
  /petstore/migrate:
    main:
      source:
        git: { url: "https://example.com/migrate.git", commit: m1 }
"#,
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deploy_then_teardown_through_manager() {
    let store = store_with_systems(&["petstore"]).await;
    let resolver = Arc::new(StaticDefinitions::new());
    resolver.insert(SystemId::new("petstore"), version("v1"), petstore_v1());
    let running = Running::start(Arc::clone(&store), resolver).await;

    store
        .deploys()
        .create(Deploy::for_version(DeployId::new("d1"), SystemId::new("petstore"), version("v1")))
        .await
        .unwrap();
    let r = &running;
    assert!(
        eventually(SETTLE, || async move {
            r.deploy_state("d1").await == Some(DeployState::Succeeded)
        })
        .await,
        "deploy did not succeed: {:?}",
        running.deploy_state("d1").await
    );

    // api and web share one definition; the sidecar and the job get their own.
    assert_eq!(store.container_build_count(), 3);
    let system = store.systems().get(&SystemId::new("petstore")).await.unwrap().unwrap();
    assert_eq!(system.spec.services.len(), 2);
    assert_eq!(system.spec.jobs.len(), 1);
    assert_eq!(system.spec.services[&support::path("/petstore/api")].instances, 2);
    assert!(system.claim.is_none());

    store
        .teardowns()
        .create(Teardown::new(TeardownId::new("t1"), SystemId::new("petstore")))
        .await
        .unwrap();
    let s = &store;
    assert!(
        eventually(SETTLE, || async move {
            s.teardowns()
                .get(&TeardownId::new("t1"))
                .await
                .unwrap()
                .is_some_and(|t| t.status.state == TeardownState::Succeeded)
        })
        .await
    );
    let system = store.systems().get(&SystemId::new("petstore")).await.unwrap().unwrap();
    assert!(system.spec.services.is_empty());
    assert!(system.status.services.is_empty());

    assert!(!running.manager.diagnostics().has_warnings());
    running.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn records_created_before_start_are_reconciled() {
    let store = store_with_systems(&["petstore"]).await;
    let resolver = Arc::new(StaticDefinitions::new());
    resolver.insert(SystemId::new("petstore"), version("v1"), petstore_v1());
    store
        .deploys()
        .create(Deploy::for_version(DeployId::new("d1"), SystemId::new("petstore"), version("v1")))
        .await
        .unwrap();

    let running = Running::start(Arc::clone(&store), resolver).await;
    let r = &running;
    assert!(
        eventually(SETTLE, || async move {
            r.deploy_state("d1").await == Some(DeployState::Succeeded)
        })
        .await
    );
    running.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_deploys_run_one_after_another() {
    let store = store_with_systems(&["petstore"]).await;
    let resolver = Arc::new(StaticDefinitions::new());
    resolver.insert(SystemId::new("petstore"), version("v1"), petstore_v1());
    let running = Running::start(Arc::clone(&store), resolver).await;

    for id in ["d1", "d2", "d3"] {
        store
            .deploys()
            .create(Deploy::for_version(DeployId::new(id), SystemId::new("petstore"), version("v1")))
            .await
            .unwrap();
    }
    let r = &running;
    assert!(
        eventually(SETTLE, || async move {
            let mut done = true;
            for id in ["d1", "d2", "d3"] {
                done &= r.deploy_state(id).await == Some(DeployState::Succeeded);
            }
            done
        })
        .await
    );

    // Every deploy of v1 lands on the same Build and container builds.
    let mut builds = Vec::new();
    for id in ["d1", "d2", "d3"] {
        let deploy = store.deploys().get(&DeployId::new(id)).await.unwrap().unwrap();
        builds.push(deploy.status.build.unwrap());
    }
    builds.dedup();
    assert_eq!(builds.len(), 1);
    assert_eq!(store.container_build_count(), 3);
    running.shutdown().await;
}
