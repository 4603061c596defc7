// ABOUTME: System record - a tenant's deployed topology plus its lifecycle claim.
// ABOUTME: Desired per-service specs, observed per-service status and the aggregate state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::container_build::ContainerArtifact;
use super::meta::{ObjectMeta, Resource, ResourceKind};
use crate::types::{BuildId, DeployId, ServicePath, SystemId, SystemMarker, TeardownId, Version};

/// Desired state of one service: how many instances of which images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub instances: u32,
    pub main: ContainerArtifact,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecars: BTreeMap<String, ContainerArtifact>,
}

/// Desired state of one job: the images it runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub main: ContainerArtifact,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecars: BTreeMap<String, ContainerArtifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    #[serde(default)]
    pub services: BTreeMap<ServicePath, ServiceSpec>,
    #[serde(default)]
    pub jobs: BTreeMap<ServicePath, JobSpec>,
}

/// Observed state of a single service, written by the downstream service reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Pending,
    Deleting,
    Scaling,
    Updating,
    Stable,
    Failed,
    /// A state this controller does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// System generation the service spec was taken from.
    pub generation: u64,
    /// How far the downstream reconciler got with `generation`.
    pub observed_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceStatus {
    pub fn new(state: ServiceState, generation: u64) -> Self {
        Self {
            state,
            generation,
            observed_generation: generation,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    #[default]
    Stable,
    Scaling,
    Updating,
    Degraded,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemState::Stable => "stable",
            SystemState::Scaling => "scaling",
            SystemState::Updating => "updating",
            SystemState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub state: SystemState,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default)]
    pub services: BTreeMap<ServicePath, ServiceStatus>,
}

/// The lifecycle action a claim can name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActionRef {
    Deploy(DeployId),
    Teardown(TeardownId),
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRef::Deploy(id) => write!(f, "deploy/{id}"),
            ActionRef::Teardown(id) => write!(f, "teardown/{id}"),
        }
    }
}

/// Exclusive right to mutate a system's desired spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleClaim {
    pub action: ActionRef,
    /// Hostname of the controller that acquired the claim.
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

impl LifecycleClaim {
    /// Create a claim for `action` held by the current host.
    pub fn new(action: ActionRef) -> Self {
        Self {
            action,
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            acquired_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub meta: ObjectMeta<SystemMarker>,
    #[serde(default)]
    pub spec: SystemSpec,
    #[serde(default)]
    pub status: SystemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<LifecycleClaim>,
}

impl System {
    pub fn new(id: SystemId) -> Self {
        Self {
            meta: ObjectMeta::new(id),
            spec: SystemSpec::default(),
            status: SystemStatus::default(),
            claim: None,
        }
    }

    /// True once the observed status accounts for spec generation `generation`.
    pub fn update_processed(&self, generation: u64) -> bool {
        self.status.observed_generation >= generation
    }

    pub fn claimed_by(&self) -> Option<&ActionRef> {
        self.claim.as_ref().map(|c| &c.action)
    }
}

impl Resource for System {
    type Marker = SystemMarker;

    const KIND: ResourceKind = ResourceKind::System;

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
