// ABOUTME: Owns the build, system, deploy and teardown controllers and runs them together.
// ABOUTME: Subscribes to watches, performs the initial list, routes events, starts workers and stops them.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use super::driver::Controller;
use super::events::{EventRouter, Queues, Routed};
use super::index::Indices;
use super::queue::WorkQueue;
use crate::build::BuildController;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::lifecycle::{DeployController, TeardownController};
use crate::model::{Build, ContainerBuild, Deploy, LabelSelector, System, Teardown};
use crate::resolver::DefinitionResolver;
use crate::store::{Store, StoreError, WatchEvent};
use crate::system::SystemController;

pub struct ControllerManager {
    store: Arc<dyn Store>,
    config: Config,
    diagnostics: Arc<Diagnostics>,
    router: Arc<EventRouter>,
    builds: Controller<BuildController>,
    systems: Controller<SystemController>,
    deploys: Controller<DeployController>,
    teardowns: Controller<TeardownController>,
}

impl ControllerManager {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<dyn DefinitionResolver>,
        config: Config,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let indices = Arc::new(Indices::default());
        let backoff = config.backoff();
        let threshold = config.failure_alert_threshold;

        let builds = Controller::new(
            Arc::new(BuildController::new(
                Arc::clone(&store),
                Arc::clone(&indices.builds_by_container_build),
                config.content_hash_width,
            )),
            Arc::new(WorkQueue::new("builds", backoff)),
            Arc::clone(&diagnostics),
            threshold,
        );
        let systems = Controller::new(
            Arc::new(SystemController::new(Arc::clone(&store))),
            Arc::new(WorkQueue::new("systems", backoff)),
            Arc::clone(&diagnostics),
            threshold,
        );
        let deploys = Controller::new(
            Arc::new(DeployController::new(
                Arc::clone(&store),
                resolver,
                config.claim_retries,
            )),
            Arc::new(WorkQueue::new("deploys", backoff)),
            Arc::clone(&diagnostics),
            threshold,
        );
        let teardowns = Controller::new(
            Arc::new(TeardownController::new(
                Arc::clone(&store),
                config.claim_retries,
            )),
            Arc::new(WorkQueue::new("teardowns", backoff)),
            Arc::clone(&diagnostics),
            threshold,
        );

        let router = Arc::new(EventRouter::new(
            indices,
            Queues {
                builds: Arc::clone(builds.queue()),
                systems: Arc::clone(systems.queue()),
                deploys: Arc::clone(deploys.queue()),
                teardowns: Arc::clone(teardowns.queue()),
            },
        ));

        Self {
            store,
            config,
            diagnostics,
            router,
            builds,
            systems,
            deploys,
            teardowns,
        }
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// True when no queue has pending or in-flight work.
    pub fn is_idle(&self) -> bool {
        self.builds.queue().is_idle()
            && self.systems.queue().is_idle()
            && self.deploys.queue().is_idle()
            && self.teardowns.queue().is_idle()
    }

    /// Run until `stop` turns true (or its sender is dropped).
    ///
    /// Watches are subscribed before the initial list so nothing written in
    /// between is missed; workers start only after every kind was listed.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), StoreError> {
        let container_builds = self.store.container_builds().watch();
        let builds = self.store.builds().watch();
        let systems = self.store.systems().watch();
        let deploys = self.store.deploys().watch();
        let teardowns = self.store.teardowns().watch();

        let listed = relist::<ContainerBuild>(self.store.as_ref(), &self.router).await?
            + relist::<Build>(self.store.as_ref(), &self.router).await?
            + relist::<System>(self.store.as_ref(), &self.router).await?
            + relist::<Deploy>(self.store.as_ref(), &self.router).await?
            + relist::<Teardown>(self.store.as_ref(), &self.router).await?;
        tracing::debug!(records = listed, "initial list complete");

        let mut routes = JoinSet::new();
        self.spawn_route(&mut routes, container_builds);
        self.spawn_route(&mut routes, builds);
        self.spawn_route(&mut routes, systems);
        self.spawn_route(&mut routes, deploys);
        self.spawn_route(&mut routes, teardowns);

        let mut workers = JoinSet::new();
        let counts = &self.config.workers;
        self.builds.spawn_workers(counts.builds, &mut workers);
        self.systems.spawn_workers(counts.systems, &mut workers);
        self.deploys.spawn_workers(counts.deploys, &mut workers);
        self.teardowns.spawn_workers(counts.teardowns, &mut workers);
        tracing::info!(
            builds = counts.builds,
            systems = counts.systems,
            deploys = counts.deploys,
            teardowns = counts.teardowns,
            "controllers started"
        );

        while !*stop.borrow_and_update() {
            if stop.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("stopping controllers");
        self.builds.queue().shut_down();
        self.systems.queue().shut_down();
        self.deploys.queue().shut_down();
        self.teardowns.queue().shut_down();
        routes.abort_all();
        while workers.join_next().await.is_some() {}
        while routes.join_next().await.is_some() {}
        tracing::info!("controllers stopped");
        Ok(())
    }

    fn spawn_route<R: Routed>(
        &self,
        set: &mut JoinSet<()>,
        events: broadcast::Receiver<WatchEvent<R>>,
    ) {
        let store = Arc::clone(&self.store);
        let router = Arc::clone(&self.router);
        let diagnostics = Arc::clone(&self.diagnostics);
        set.spawn(route_events(store, router, diagnostics, events));
    }
}

async fn route_events<R: Routed>(
    store: Arc<dyn Store>,
    router: Arc<EventRouter>,
    diagnostics: Arc<Diagnostics>,
    mut events: broadcast::Receiver<WatchEvent<R>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => R::route(&router, &event),
            Err(RecvError::Lagged(skipped)) => {
                diagnostics.warn(Warning::watch_lagged(R::KIND, skipped));
                if let Err(err) = relist::<R>(store.as_ref(), &router).await {
                    tracing::warn!(kind = %R::KIND, "re-list after lag failed: {err}");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Feed every stored record of kind `R` through the router as if just added.
async fn relist<R: Routed>(store: &dyn Store, router: &EventRouter) -> Result<usize, StoreError> {
    let records = R::collection(store)
        .list(&LabelSelector::everything())
        .await?;
    let count = records.len();
    for record in records {
        R::route(router, &WatchEvent::Added(record));
    }
    Ok(count)
}
