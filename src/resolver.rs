// ABOUTME: Definition resolver seam - turns (system, version) into the containers to build.
// ABOUTME: Includes a static in-memory resolver used by tests and simulations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BuildSpec, ServiceBuildSpec, WorkloadBuildSpec};
use crate::types::{ServicePath, SystemId, Version};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("system {system} has no definition for version {version}")]
    VersionNotFound { system: SystemId, version: Version },

    #[error("definition source unavailable: {0}")]
    Unavailable(String),
}

impl ResolveError {
    /// Whether retrying cannot help and the requester should fail.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolveError::VersionNotFound { .. })
    }
}

/// Services and jobs declared by one version of a system definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDefinition {
    #[serde(default)]
    pub services: BTreeMap<ServicePath, ServiceBuildSpec>,
    #[serde(default)]
    pub jobs: BTreeMap<ServicePath, WorkloadBuildSpec>,
}

impl SystemDefinition {
    /// Build spec for `system` at `version`.
    pub fn into_build_spec(self, system: SystemId, version: Version) -> BuildSpec {
        BuildSpec {
            system,
            version: Some(version),
            services: self.services,
            jobs: self.jobs,
        }
    }
}

/// Resolves a system version to the build it requires.
#[async_trait]
pub trait DefinitionResolver: Send + Sync + 'static {
    async fn resolve(&self, system: &SystemId, version: &Version) -> Result<BuildSpec, ResolveError>;
}

/// Resolver over definitions registered up front.
#[derive(Default)]
pub struct StaticDefinitions {
    definitions: RwLock<HashMap<(SystemId, Version), SystemDefinition>>,
}

impl StaticDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, system: SystemId, version: Version, definition: SystemDefinition) {
        self.definitions.write().insert((system, version), definition);
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

#[async_trait]
impl DefinitionResolver for StaticDefinitions {
    async fn resolve(&self, system: &SystemId, version: &Version) -> Result<BuildSpec, ResolveError> {
        let key = (system.clone(), version.clone());
        let definition = self.definitions.read().get(&key).cloned();
        definition
            .map(|d| d.into_build_spec(system.clone(), version.clone()))
            .ok_or_else(|| ResolveError::VersionNotFound {
                system: system.clone(),
                version: version.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContainerBuildDefinition;

    #[tokio::test]
    async fn resolves_registered_version() {
        let resolver = StaticDefinitions::new();
        let mut definition = SystemDefinition::default();
        definition.jobs.insert(
            ServicePath::new("/petstore/migrate").unwrap(),
            WorkloadBuildSpec::new(ContainerBuildDefinition::image("postgres:16")),
        );
        resolver.insert(
            SystemId::new("petstore"),
            Version::new("v1").unwrap(),
            definition,
        );

        let spec = resolver
            .resolve(&SystemId::new("petstore"), &Version::new("v1").unwrap())
            .await
            .unwrap();
        assert_eq!(spec.system, SystemId::new("petstore"));
        assert_eq!(spec.version, Some(Version::new("v1").unwrap()));
        assert_eq!(spec.jobs.len(), 1);
    }

    #[tokio::test]
    async fn unknown_version_is_terminal() {
        let resolver = StaticDefinitions::new();
        let err = resolver
            .resolve(&SystemId::new("petstore"), &Version::new("v9").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_terminal());
        assert!(!ResolveError::Unavailable("timeout".into()).is_terminal());
    }
}
