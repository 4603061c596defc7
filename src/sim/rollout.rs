// ABOUTME: Simulated service rollout that reports observed per-service status on Systems.
// ABOUTME: Desired services become Stable (or Failed when configured); undesired ones disappear.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::model::{LabelSelector, ServiceState, ServiceStatus, System};
use crate::store::{Store, StoreError};
use crate::types::ServicePath;

pub struct FakeRollout {
    store: Arc<dyn Store>,
    failing: HashSet<ServicePath>,
}

impl FakeRollout {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            failing: HashSet::new(),
        }
    }

    /// Rollouts of these services fail.
    pub fn failing_services(mut self, paths: impl IntoIterator<Item = ServicePath>) -> Self {
        self.failing.extend(paths);
        self
    }

    /// Report status for every system whose observed services lag its spec.
    /// Returns how many systems were written.
    pub async fn step(&self) -> Result<usize, StoreError> {
        let collection = self.store.systems();
        let mut written = 0;
        for system in collection.list(&LabelSelector::everything()).await? {
            let services = self.observe(&system);
            if services == system.status.services {
                continue;
            }
            let mut next = system;
            next.status.services = services;
            match collection.update(next).await {
                Ok(updated) => {
                    tracing::debug!(system = %updated.meta.id, generation = updated.meta.generation, "rollout reported services");
                    written += 1;
                }
                Err(err) if err.is_conflict() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    fn observe(&self, system: &System) -> BTreeMap<ServicePath, ServiceStatus> {
        let generation = system.meta.generation;
        system
            .spec
            .services
            .keys()
            .map(|path| {
                let status = if self.failing.contains(path) {
                    let mut status = ServiceStatus::new(ServiceState::Failed, generation);
                    status.message = Some("instances failed health checks".to_string());
                    status
                } else {
                    ServiceStatus::new(ServiceState::Stable, generation)
                };
                (path.clone(), status)
            })
            .collect()
    }

    /// Step every `tick` until `stop` turns true.
    pub async fn run(self, mut stop: watch::Receiver<bool>, tick: Duration) {
        while !*stop.borrow() {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(tick) => {
                    if let Err(err) = self.step().await {
                        tracing::warn!("simulated rollout step failed: {err}");
                    }
                }
            }
        }
    }
}
