// ABOUTME: Deploy controller - Pending -> Accepted -> InProgress -> Succeeded/Failed.
// ABOUTME: Builds (or reuses) the target Build, then writes its artifacts to the System under the claim.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::claim::{ClaimManager, ClaimOutcome};
use super::error::ClaimError;
use super::{Rollout, rollout};
use crate::controller::driver::Reconciler;
use crate::controller::error::{ReconcileError, Result};
use crate::model::{
    ActionRef, Build, BuildState, ContainerArtifact, ContainerBuildRefs, Deploy, DeployState,
    JobSpec, LabelSelector, OwnerRef, Resource, ResourceKind, ServiceSpec, labels,
};
use crate::resolver::DefinitionResolver;
use crate::store::Store;
use crate::types::{BuildId, ContainerBuildId, DeployId, ServicePath, SystemId, Version};

enum Target {
    Build(BuildId),
    Version(Version),
}

pub struct DeployController {
    store: Arc<dyn Store>,
    claims: ClaimManager,
    resolver: Arc<dyn DefinitionResolver>,
}

impl DeployController {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<dyn DefinitionResolver>,
        claim_retries: u32,
    ) -> Self {
        let claims = ClaimManager::new(Arc::clone(&store), claim_retries);
        Self {
            store,
            claims,
            resolver,
        }
    }

    async fn pending(&self, deploy: Deploy) -> Result<()> {
        let target = match (&deploy.spec.build, &deploy.spec.version) {
            (Some(build), None) => Target::Build(build.clone()),
            (None, Some(version)) => Target::Version(version.clone()),
            _ => {
                let message = "exactly one of build or version must be set".to_string();
                return self.finish(deploy, DeployState::Failed, Some(message)).await;
            }
        };

        let system_id = deploy.spec.system.clone();
        let action = ActionRef::Deploy(deploy.meta.id.clone());
        match self.claims.acquire(&system_id, &action).await {
            Ok(ClaimOutcome::Acquired(_)) => {}
            Ok(ClaimOutcome::Held(holder)) => {
                tracing::debug!(deploy = %deploy.meta.id, system = %system_id, holder = %holder, "waiting for lifecycle claim");
                return Ok(());
            }
            Err(ClaimError::SystemNotFound { .. }) => {
                let message = format!("System {system_id} not found");
                return self.finish(deploy, DeployState::Failed, Some(message)).await;
            }
            Err(err) => return Err(err.into()),
        }

        let build_id = match target {
            Target::Build(id) => match self.store.builds().get(&id).await? {
                Some(build) if build.spec.system == system_id => id,
                Some(build) => {
                    let message = format!(
                        "Build {id} belongs to system {}, not {system_id}",
                        build.spec.system
                    );
                    return self.finish(deploy, DeployState::Failed, Some(message)).await;
                }
                None => {
                    let message = format!("Build {id} not found");
                    return self.finish(deploy, DeployState::Failed, Some(message)).await;
                }
            },
            Target::Version(version) => match self.reusable_build(&system_id, &version).await? {
                Some(id) => id,
                None => match self.resolver.resolve(&system_id, &version).await {
                    Ok(spec) => {
                        let mut build = Build::new(BuildId::generate(), spec);
                        build
                            .meta
                            .owners
                            .push(OwnerRef::new(ResourceKind::Deploy, &deploy.meta.id));
                        let created = self.store.builds().create(build).await?;
                        tracing::info!(deploy = %deploy.meta.id, build = %created.meta.id, version = %version, "created build for deploy");
                        created.meta.id
                    }
                    Err(err) if err.is_terminal() => {
                        return self
                            .finish(deploy, DeployState::Failed, Some(err.to_string()))
                            .await;
                    }
                    Err(err) => return Err(err.into()),
                },
            },
        };

        let id = deploy.meta.id.clone();
        let mut deploy = deploy;
        deploy.status.state = DeployState::Accepted;
        deploy.status.build = Some(build_id.clone());
        deploy.status.message = None;
        deploy.status.observed_generation = deploy.meta.generation;
        self.store.deploys().update(deploy).await?;
        tracing::info!(deploy = %id, system = %system_id, build = %build_id, "deploy accepted");
        Ok(())
    }

    /// Oldest non-failed Build of `system` at `version`.
    async fn reusable_build(&self, system: &SystemId, version: &Version) -> Result<Option<BuildId>> {
        let selector = LabelSelector::default()
            .with(labels::SYSTEM, system.as_str())
            .with(labels::VERSION, version.as_str());
        let mut builds: Vec<Build> = self
            .store
            .builds()
            .list(&selector)
            .await?
            .into_iter()
            .filter(|b| b.status.state != BuildState::Failed)
            .collect();
        builds.sort_by(|a, b| {
            a.meta
                .created_at
                .cmp(&b.meta.created_at)
                .then_with(|| a.meta.id.cmp(&b.meta.id))
        });
        Ok(builds.into_iter().next().map(|b| b.meta.id))
    }

    async fn accepted(&self, mut deploy: Deploy) -> Result<()> {
        let Some(build_id) = deploy.status.build.clone() else {
            return Err(ReconcileError::invariant(format!(
                "deploy {} is accepted without a build",
                deploy.meta.id
            )));
        };
        let Some(build) = self.store.builds().get(&build_id).await? else {
            let message = format!("Build {build_id} not found");
            return self.finish(deploy, DeployState::Failed, Some(message)).await;
        };
        if !build.status_is_current() {
            return Ok(());
        }

        match build.status.state {
            BuildState::Pending | BuildState::Running => Ok(()),
            BuildState::Failed => {
                let message = format!("Build {build_id} failed");
                self.finish(deploy, DeployState::Failed, Some(message)).await
            }
            BuildState::Succeeded => {
                let (services, jobs) = desired_workloads(&build)?;
                let version = build.spec.version.clone();
                let system_id = deploy.spec.system.clone();
                let action = ActionRef::Deploy(deploy.meta.id.clone());

                let written = self
                    .claims
                    .apply_spec(&system_id, &action, |spec| {
                        spec.services = services.clone();
                        spec.jobs = jobs.clone();
                        spec.build = Some(build_id.clone());
                        spec.version = version.clone();
                    })
                    .await;
                let system = match written {
                    Ok(system) => system,
                    Err(ClaimError::SystemNotFound { .. }) => {
                        let message = format!("System {system_id} not found");
                        return self.finish(deploy, DeployState::Failed, Some(message)).await;
                    }
                    Err(err) => return Err(err.into()),
                };

                let id = deploy.meta.id.clone();
                deploy.status.state = DeployState::InProgress;
                deploy.status.system_generation = Some(system.meta.generation);
                self.store.deploys().update(deploy).await?;
                tracing::info!(deploy = %id, system = %system_id, generation = system.meta.generation, "rolling out build");
                Ok(())
            }
        }
    }

    async fn in_progress(&self, deploy: Deploy) -> Result<()> {
        let Some(generation) = deploy.status.system_generation else {
            return Err(ReconcileError::invariant(format!(
                "deploy {} is in progress without a system generation",
                deploy.meta.id
            )));
        };
        let Some(system) = self.store.systems().get(&deploy.spec.system).await? else {
            let message = format!("System {} not found", deploy.spec.system);
            return self.finish(deploy, DeployState::Failed, Some(message)).await;
        };

        match rollout(&system, generation) {
            Rollout::Waiting => Ok(()),
            Rollout::Stable => self.finish(deploy, DeployState::Succeeded, None).await,
            Rollout::Degraded(message) => {
                self.finish(deploy, DeployState::Failed, Some(message)).await
            }
        }
    }

    /// Write the terminal status, then let go of the claim.
    async fn finish(&self, mut deploy: Deploy, state: DeployState, message: Option<String>) -> Result<()> {
        deploy.status.state = state;
        deploy.status.message = message;
        deploy.status.completed_at = Some(Utc::now());
        deploy.status.observed_generation = deploy.meta.generation;
        let deploy = self.store.deploys().update(deploy).await?;

        match &deploy.status.message {
            Some(message) if state == DeployState::Failed => {
                tracing::warn!(deploy = %deploy.meta.id, system = %deploy.spec.system, "deploy failed: {message}");
            }
            _ => {
                tracing::info!(deploy = %deploy.meta.id, system = %deploy.spec.system, state = %state, "deploy finished");
            }
        }
        self.release(&deploy).await
    }

    async fn release(&self, deploy: &Deploy) -> Result<()> {
        let action = ActionRef::Deploy(deploy.meta.id.clone());
        self.claims.release(&deploy.spec.system, &action).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for DeployController {
    type Key = DeployId;

    const KIND: ResourceKind = ResourceKind::Deploy;

    async fn sync(&self, id: &DeployId) -> Result<()> {
        let Some(deploy) = self.store.deploys().get(id).await? else {
            tracing::debug!(deploy = %id, "deploy no longer exists");
            return Ok(());
        };

        match deploy.status.state {
            DeployState::Pending => self.pending(deploy).await,
            DeployState::Accepted => self.accepted(deploy).await,
            DeployState::InProgress => self.in_progress(deploy).await,
            // A release interrupted after the terminal write is finished here.
            DeployState::Succeeded | DeployState::Failed => self.release(&deploy).await,
        }
    }
}

type Workloads = (BTreeMap<ServicePath, ServiceSpec>, BTreeMap<ServicePath, JobSpec>);

/// Desired System services and jobs for a succeeded build.
pub fn desired_workloads(build: &Build) -> Result<Workloads> {
    let mut services = BTreeMap::new();
    for (path, service) in &build.spec.services {
        let refs = mapping(build, build.status.services.get(path), path)?;
        services.insert(
            path.clone(),
            ServiceSpec {
                instances: service.instances,
                main: artifact(build, &refs.main)?,
                sidecars: sidecar_artifacts(build, refs)?,
            },
        );
    }

    let mut jobs = BTreeMap::new();
    for path in build.spec.jobs.keys() {
        let refs = mapping(build, build.status.jobs.get(path), path)?;
        jobs.insert(
            path.clone(),
            JobSpec {
                main: artifact(build, &refs.main)?,
                sidecars: sidecar_artifacts(build, refs)?,
            },
        );
    }
    Ok((services, jobs))
}

fn mapping<'a>(
    build: &Build,
    refs: Option<&'a ContainerBuildRefs>,
    path: &ServicePath,
) -> Result<&'a ContainerBuildRefs> {
    refs.ok_or_else(|| {
        ReconcileError::invariant(format!(
            "succeeded build {} has no container builds for {path}",
            build.id()
        ))
    })
}

fn sidecar_artifacts(
    build: &Build,
    refs: &ContainerBuildRefs,
) -> Result<BTreeMap<String, ContainerArtifact>> {
    refs.sidecars
        .iter()
        .map(|(name, id)| Ok((name.clone(), artifact(build, id)?)))
        .collect()
}

fn artifact(build: &Build, id: &ContainerBuildId) -> Result<ContainerArtifact> {
    build
        .status
        .container_builds
        .get(id)
        .and_then(|status| status.artifact.clone())
        .ok_or_else(|| {
            ReconcileError::invariant(format!(
                "container build {id} of succeeded build {} has no artifact",
                build.id()
            ))
        })
}
