// ABOUTME: Scenario files: systems, definition versions and lifecycle actions to replay.
// ABOUTME: Runs them through the controllers with the simulated builder and rollout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::Instant;

use super::{FakeBuilder, FakeRollout};
use crate::config::Config;
use crate::controller::ControllerManager;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::model::{Deploy, DeploySpec, ResourceKind, System, Teardown};
use crate::resolver::{StaticDefinitions, SystemDefinition};
use crate::store::{MemoryStore, Store};
use crate::types::{BuildId, DeployId, ServicePath, SystemId, TeardownId, Version};

/// How often the simulated collaborators and the waiter look at the store.
const TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub systems: Vec<SystemId>,

    #[serde(default)]
    pub versions: Vec<VersionEntry>,

    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub actions: Vec<ScenarioAction>,

    #[serde(default)]
    pub builder: BuilderSettings,

    #[serde(default)]
    pub rollout: RolloutSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub system: SystemId,
    pub version: Version,
    #[serde(flatten)]
    pub definition: SystemDefinition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioAction {
    Deploy {
        system: SystemId,
        #[serde(default)]
        version: Option<Version>,
        #[serde(default)]
        build: Option<BuildId>,
    },
    Teardown {
        system: SystemId,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuilderSettings {
    #[serde(default)]
    pub fail_commits: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolloutSettings {
    #[serde(default)]
    pub failing_services: Vec<ServicePath>,
}

/// Outcome of one replayed action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub action: String,
    pub system: SystemId,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionReport {
    pub fn succeeded(&self) -> bool {
        self.state == "succeeded"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub actions: Vec<ActionReport>,
    pub container_builds: usize,
    pub warnings: Vec<Warning>,
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::InvalidScenario("no actions to run".into()));
        }
        for (index, action) in self.actions.iter().enumerate() {
            if let ScenarioAction::Deploy { version, build, .. } = action
                && version.is_some() == build.is_some()
            {
                return Err(Error::InvalidScenario(format!(
                    "action {}: a deploy needs exactly one of version or build",
                    index + 1
                )));
            }
        }
        Ok(())
    }

    /// Replay every action in order, each one to completion, within `timeout`.
    /// `on_action` is called as each action finishes.
    pub async fn run(
        self,
        config: Config,
        timeout: Duration,
        mut on_action: impl FnMut(&ActionReport),
    ) -> Result<ScenarioReport> {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::with_watch_buffer(config.watch_buffer));
        let dyn_store = Arc::clone(&store) as Arc<dyn Store>;

        let resolver = Arc::new(StaticDefinitions::new());
        for entry in self.versions {
            resolver.insert(entry.system, entry.version, entry.definition);
        }
        for system in self.systems {
            store.systems().create(System::new(system)).await?;
        }

        let diagnostics = Arc::new(Diagnostics::default());
        let manager = Arc::new(ControllerManager::new(
            Arc::clone(&dyn_store),
            resolver,
            config,
            Arc::clone(&diagnostics),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let controllers = {
            let manager = Arc::clone(&manager);
            let stop = stop_rx.clone();
            tokio::spawn(async move { manager.run(stop).await })
        };
        let builder = FakeBuilder::new(Arc::clone(&dyn_store))
            .failing_commits(self.builder.fail_commits);
        let rollout = FakeRollout::new(Arc::clone(&dyn_store))
            .failing_services(self.rollout.failing_services);
        let builder = tokio::spawn(builder.run(stop_rx.clone(), TICK));
        let rollout = tokio::spawn(rollout.run(stop_rx, TICK));

        let deadline = Instant::now() + timeout;
        let mut reports = Vec::new();
        let mut outcome = Ok(());
        for (index, action) in self.actions.into_iter().enumerate() {
            match replay(store.as_ref(), index + 1, action, deadline).await {
                Ok(report) => {
                    on_action(&report);
                    reports.push(report);
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        // Stop everything before reporting, whatever happened.
        let _ = stop_tx.send(true);
        record_task(&diagnostics, ResourceKind::ContainerBuild, "simulated builder", builder.await);
        record_task(&diagnostics, ResourceKind::System, "simulated rollout", rollout.await);
        match controllers.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("controllers stopped with error: {err}"),
            Err(err) => tracing::warn!("controller task failed: {err}"),
        }

        outcome.map_err(|err| match err {
            Error::Timeout(_) => Error::Timeout(timeout),
            other => other,
        })?;

        Ok(ScenarioReport {
            actions: reports,
            container_builds: store.container_build_count(),
            warnings: diagnostics.warnings(),
        })
    }
}

async fn replay(
    store: &MemoryStore,
    number: usize,
    action: ScenarioAction,
    deadline: Instant,
) -> Result<ActionReport> {
    match action {
        ScenarioAction::Deploy {
            system,
            version,
            build,
        } => {
            let id = DeployId::new(format!("deploy-{number}"));
            let spec = DeploySpec {
                system: system.clone(),
                build,
                version,
            };
            store.deploys().create(Deploy::new(id.clone(), spec)).await?;
            loop {
                if let Some(deploy) = store.deploys().get(&id).await?
                    && deploy.status.state.is_terminal()
                {
                    return Ok(ActionReport {
                        action: format!("deploy/{id}"),
                        system,
                        state: deploy.status.state.to_string(),
                        message: deploy.status.message,
                    });
                }
                wait(deadline).await?;
            }
        }
        ScenarioAction::Teardown { system } => {
            let id = TeardownId::new(format!("teardown-{number}"));
            store
                .teardowns()
                .create(Teardown::new(id.clone(), system.clone()))
                .await?;
            loop {
                if let Some(teardown) = store.teardowns().get(&id).await?
                    && teardown.status.state.is_terminal()
                {
                    return Ok(ActionReport {
                        action: format!("teardown/{id}"),
                        system,
                        state: teardown.status.state.to_string(),
                        message: teardown.status.message,
                    });
                }
                wait(deadline).await?;
            }
        }
    }
}

/// Surface a collaborator task that panicked instead of dropping its result.
fn record_task(
    diagnostics: &Diagnostics,
    resource: ResourceKind,
    task: &str,
    joined: std::result::Result<(), JoinError>,
) {
    if let Err(err) = joined {
        diagnostics.warn(Warning::task_failed(resource, task, format!("{task} task failed: {err}")));
    }
}

async fn wait(deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(Error::Timeout(Duration::ZERO));
    }
    tokio::time::sleep(TICK).await;
    Ok(())
}
