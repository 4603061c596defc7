// ABOUTME: Deploy and Teardown records - lifecycle actions against a system.
// ABOUTME: Both compete for the system's lifecycle claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::meta::{ObjectMeta, Resource, ResourceKind};
use super::labels;
use crate::types::{BuildId, DeployId, DeployMarker, SystemId, TeardownId, TeardownMarker, Version};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
    pub system: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployState {
    #[default]
    Pending,
    Accepted,
    InProgress,
    Succeeded,
    Failed,
}

impl DeployState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeployState::Succeeded | DeployState::Failed)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployState::Pending => "pending",
            DeployState::Accepted => "accepted",
            DeployState::InProgress => "in-progress",
            DeployState::Succeeded => "succeeded",
            DeployState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    pub state: DeployState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildId>,
    /// System spec generation written on behalf of this deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub meta: ObjectMeta<DeployMarker>,
    pub spec: DeploySpec,
    #[serde(default)]
    pub status: DeployStatus,
}

impl Deploy {
    pub fn new(id: DeployId, spec: DeploySpec) -> Self {
        let meta = ObjectMeta::new(id).with_label(labels::SYSTEM, spec.system.as_str());
        Self {
            meta,
            spec,
            status: DeployStatus::default(),
        }
    }

    /// Deploy an existing build.
    pub fn for_build(id: DeployId, system: SystemId, build: BuildId) -> Self {
        Self::new(
            id,
            DeploySpec {
                system,
                build: Some(build),
                version: None,
            },
        )
    }

    /// Deploy a version, building it first.
    pub fn for_version(id: DeployId, system: SystemId, version: Version) -> Self {
        Self::new(
            id,
            DeploySpec {
                system,
                build: None,
                version: Some(version),
            },
        )
    }
}

impl Resource for Deploy {
    type Marker = DeployMarker;

    const KIND: ResourceKind = ResourceKind::Deploy;

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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownSpec {
    pub system: SystemId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeardownState {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TeardownState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TeardownState::Succeeded | TeardownState::Failed)
    }
}

impl fmt::Display for TeardownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownState::Pending => "pending",
            TeardownState::InProgress => "in-progress",
            TeardownState::Succeeded => "succeeded",
            TeardownState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownStatus {
    pub state: TeardownState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teardown {
    pub meta: ObjectMeta<TeardownMarker>,
    pub spec: TeardownSpec,
    #[serde(default)]
    pub status: TeardownStatus,
}

impl Teardown {
    pub fn new(id: TeardownId, system: SystemId) -> Self {
        let meta = ObjectMeta::new(id).with_label(labels::SYSTEM, system.as_str());
        Self {
            meta,
            spec: TeardownSpec { system },
            status: TeardownStatus::default(),
        }
    }
}

impl Resource for Teardown {
    type Marker = TeardownMarker;

    const KIND: ResourceKind = ResourceKind::Teardown;

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
