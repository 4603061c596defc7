// ABOUTME: Records exchanged with the resource store.
// ABOUTME: ContainerBuild, Build, System, Deploy and Teardown plus shared metadata.

mod build;
mod container_build;
mod deploy;
mod meta;
mod system;

pub use build::{
    Build, BuildSpec, BuildState, BuildStatus, ContainerBuildRefs, ServiceBuildSpec,
    WorkloadBuildSpec,
};
pub use container_build::{
    BuildSource, ContainerArtifact, ContainerBuild, ContainerBuildDefinition,
    ContainerBuildFailure, ContainerBuildPhase, ContainerBuildState, ContainerBuildStatus,
};
pub use deploy::{
    Deploy, DeploySpec, DeployState, DeployStatus, Teardown, TeardownSpec, TeardownState,
    TeardownStatus,
};
pub use meta::{LabelSelector, ObjectMeta, OwnerRef, Resource, ResourceKind};
pub use system::{
    ActionRef, JobSpec, LifecycleClaim, ServiceSpec, ServiceState, ServiceStatus, System,
    SystemSpec, SystemState, SystemStatus,
};

/// Label keys the controllers index on.
pub mod labels {
    /// Content hash of a container build definition.
    pub const DEFINITION_HASH: &str = "keel.dev/definition-hash";
    /// System a container build was created for; dedup happens within a scope.
    pub const SCOPE: &str = "keel.dev/scope";
    /// System a build, deploy or teardown belongs to.
    pub const SYSTEM: &str = "keel.dev/system";
    /// Definition version a build was created from.
    pub const VERSION: &str = "keel.dev/version";
}
