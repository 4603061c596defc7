// ABOUTME: Simulated image builder that drives ContainerBuild status forward.
// ABOUTME: Pending -> Running -> Succeeded (or Failed for configured commits), one step per tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::model::{
    BuildSource, ContainerArtifact, ContainerBuild, ContainerBuildFailure, ContainerBuildPhase,
    ContainerBuildState, LabelSelector,
};
use crate::store::{Store, StoreError};

pub struct FakeBuilder {
    store: Arc<dyn Store>,
    fail_commits: HashSet<String>,
}

impl FakeBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            fail_commits: HashSet::new(),
        }
    }

    /// Builds of these git commits fail.
    pub fn failing_commits(mut self, commits: impl IntoIterator<Item = String>) -> Self {
        self.fail_commits.extend(commits);
        self
    }

    /// Advance every unfinished container build by one state.
    /// Returns how many records were written.
    pub async fn step(&self) -> Result<usize, StoreError> {
        let collection = self.store.container_builds();
        let mut advanced = 0;
        for cb in collection.list(&LabelSelector::everything()).await? {
            let Some(next) = self.advance(&cb) else {
                continue;
            };
            match collection.update(next).await {
                Ok(updated) => {
                    tracing::debug!(container_build = %updated.meta.id, state = ?updated.status.state, "builder advanced container build");
                    advanced += 1;
                }
                // Someone else wrote it; look again next tick.
                Err(err) if err.is_conflict() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(advanced)
    }

    fn advance(&self, cb: &ContainerBuild) -> Option<ContainerBuild> {
        let mut next = cb.clone();
        match cb.status.state {
            ContainerBuildState::Pending | ContainerBuildState::Queued => {
                next.status.state = ContainerBuildState::Running;
                next.status.last_observed_phase = Some(ContainerBuildPhase::Building);
            }
            ContainerBuildState::Running => match &cb.definition.source {
                BuildSource::Git { commit, .. } if self.fail_commits.contains(commit) => {
                    next.status.state = ContainerBuildState::Failed;
                    next.status.failure = Some(ContainerBuildFailure {
                        message: format!("build of commit {commit} exited with status 1"),
                        internal: false,
                    });
                }
                source => {
                    next.status.state = ContainerBuildState::Succeeded;
                    next.status.last_observed_phase = Some(ContainerBuildPhase::Pushing);
                    next.status.artifact = Some(artifact(cb, source));
                }
            },
            ContainerBuildState::Succeeded | ContainerBuildState::Failed => return None,
        }
        Some(next)
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
                        tracing::warn!("simulated builder step failed: {err}");
                    }
                }
            }
        }
    }
}

fn artifact(cb: &ContainerBuild, source: &BuildSource) -> ContainerArtifact {
    let image = match source {
        BuildSource::Image { reference } => reference.clone(),
        BuildSource::Git { .. } => {
            let tag = cb.content_hash().unwrap_or(cb.meta.id.as_str());
            format!("registry.local/{tag}")
        }
    };
    ContainerArtifact { image }
}
