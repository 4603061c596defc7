// ABOUTME: ContainerBuild record - one build of one container image.
// ABOUTME: Shared between Builds through its content hash label.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::labels;
use super::meta::{ObjectMeta, OwnerRef, Resource, ResourceKind};
use crate::types::{ContainerBuildId, ContainerBuildMarker, ContentHash, SystemId};

/// Where the image is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSource {
    /// Build from a commit of a git repository.
    Git {
        url: String,
        commit: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    /// Use an already published image as is.
    Image { reference: String },
}

/// Declared build of a single container. This is the value that gets hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBuildDefinition {
    /// Written as a single-key map (`git: {...}` or `image: {...}`) in YAML.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: BuildSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_args: BTreeMap<String, String>,
}

impl ContainerBuildDefinition {
    pub fn git(url: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            source: BuildSource::Git {
                url: url.into(),
                commit: commit.into(),
                context: None,
            },
            base_image: None,
            command: Vec::new(),
            build_args: BTreeMap::new(),
        }
    }

    pub fn image(reference: impl Into<String>) -> Self {
        Self {
            source: BuildSource::Image {
                reference: reference.into(),
            },
            base_image: None,
            command: Vec::new(),
            build_args: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerBuildState {
    #[default]
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Last phase reported by the build process while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerBuildPhase {
    FetchingSource,
    Building,
    Pushing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBuildFailure {
    pub message: String,
    /// True when the failure came from the platform rather than user code.
    #[serde(default)]
    pub internal: bool,
}

/// Result of a successful container build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerArtifact {
    /// Fully qualified image reference, e.g. `registry/repo@sha256:...`.
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBuildStatus {
    pub state: ContainerBuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_phase: Option<ContainerBuildPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ContainerBuildFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ContainerArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerBuild {
    pub meta: ObjectMeta<ContainerBuildMarker>,
    pub definition: ContainerBuildDefinition,
    #[serde(default)]
    pub status: ContainerBuildStatus,
}

impl ContainerBuild {
    /// A new pending container build, labeled for dedup lookups.
    pub fn new(
        id: ContainerBuildId,
        definition: ContainerBuildDefinition,
        hash: &ContentHash,
        scope: &SystemId,
        owner: OwnerRef,
    ) -> Self {
        let meta = ObjectMeta::new(id)
            .with_label(labels::DEFINITION_HASH, hash.as_str())
            .with_label(labels::SCOPE, scope.as_str())
            .with_owner(owner);
        Self {
            meta,
            definition,
            status: ContainerBuildStatus::default(),
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.meta.label(labels::DEFINITION_HASH)
    }

    pub fn is_failed(&self) -> bool {
        self.status.state == ContainerBuildState::Failed
    }
}

impl Resource for ContainerBuild {
    type Marker = ContainerBuildMarker;

    const KIND: ResourceKind = ResourceKind::ContainerBuild;

    fn meta(&self) -> &ObjectMeta<Self::Marker> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta<Self::Marker> {
        &mut self.meta
    }

    fn spec_differs(&self, previous: &Self) -> bool {
        self.definition != previous.definition
    }
}
