// ABOUTME: Build record - one build request for an entire system version.
// ABOUTME: Maps service and job paths to the container builds that produce their images.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::container_build::{ContainerBuildDefinition, ContainerBuildStatus};
use super::labels;
use super::meta::{ObjectMeta, Resource, ResourceKind};
use crate::types::{BuildId, BuildMarker, ContainerBuildId, ServicePath, SystemId, Version};

/// Containers declared for one service or job: a main container plus named sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadBuildSpec {
    pub main: ContainerBuildDefinition,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecars: BTreeMap<String, ContainerBuildDefinition>,
}

impl WorkloadBuildSpec {
    pub fn new(main: ContainerBuildDefinition) -> Self {
        Self {
            main,
            sidecars: BTreeMap::new(),
        }
    }

    pub fn with_sidecar(mut self, name: &str, definition: ContainerBuildDefinition) -> Self {
        self.sidecars.insert(name.to_string(), definition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBuildSpec {
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[serde(flatten)]
    pub containers: WorkloadBuildSpec,
}

fn default_instances() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub system: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default)]
    pub services: BTreeMap<ServicePath, ServiceBuildSpec>,
    #[serde(default)]
    pub jobs: BTreeMap<ServicePath, WorkloadBuildSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Succeeded | BuildState::Failed)
    }
}

/// Container build references for one service or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBuildRefs {
    pub main: ContainerBuildId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecars: BTreeMap<String, ContainerBuildId>,
}

impl ContainerBuildRefs {
    pub fn ids(&self) -> impl Iterator<Item = &ContainerBuildId> {
        std::iter::once(&self.main).chain(self.sidecars.values())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub state: BuildState,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<ServicePath, ContainerBuildRefs>,
    #[serde(default)]
    pub jobs: BTreeMap<ServicePath, ContainerBuildRefs>,
    /// Last seen status of every referenced container build.
    #[serde(default)]
    pub container_builds: BTreeMap<ContainerBuildId, ContainerBuildStatus>,
}

impl BuildStatus {
    /// Every container build referenced from the service and job mappings.
    pub fn referenced_container_builds(&self) -> impl Iterator<Item = &ContainerBuildId> {
        self.services
            .values()
            .chain(self.jobs.values())
            .flat_map(ContainerBuildRefs::ids)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub meta: ObjectMeta<BuildMarker>,
    pub spec: BuildSpec,
    #[serde(default)]
    pub status: BuildStatus,
}

impl Build {
    pub fn new(id: BuildId, spec: BuildSpec) -> Self {
        let mut meta = ObjectMeta::new(id).with_label(labels::SYSTEM, spec.system.as_str());
        if let Some(version) = &spec.version {
            meta = meta.with_label(labels::VERSION, version.as_str());
        }
        Self {
            meta,
            spec,
            status: BuildStatus::default(),
        }
    }

    /// True once the status reflects the current spec generation.
    pub fn status_is_current(&self) -> bool {
        self.status.observed_generation >= self.meta.generation
    }
}

impl Resource for Build {
    type Marker = BuildMarker;

    const KIND: ResourceKind = ResourceKind::Build;

    fn meta(&self) -> &ObjectMeta<Self::Marker> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta<Self::Marker> {
        &mut self.meta
    }

    fn spec_differs(&self, previous: &Self) -> bool {
        self.spec != previous.spec
    }
}
