// ABOUTME: Versioned resource store interface consumed by the controllers.
// ABOUTME: Per-kind collections with optimistic-concurrency writes and watch streams.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{
    Build, ContainerBuild, Deploy, LabelSelector, Resource, ResourceKind, System, Teardown,
};
use crate::types::Id;

pub use memory::MemoryStore;

/// Errors from store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: ResourceKind, id: String },

    #[error("{kind} {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        kind: ResourceKind,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found<T>(kind: ResourceKind, id: &Id<T>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Optimistic concurrency rejection: re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Change notification. Delivered at least once; bursts may be coalesced or
/// dropped under lag, so consumers treat events as hints and re-read.
#[derive(Debug, Clone)]
pub enum WatchEvent<R> {
    Added(R),
    Modified(R),
    Deleted(R),
}

impl<R> WatchEvent<R> {
    pub fn resource(&self) -> &R {
        match self {
            WatchEvent::Added(r) | WatchEvent::Modified(r) | WatchEvent::Deleted(r) => r,
        }
    }
}

/// Operations on records of one kind.
///
/// `update` succeeds only if the record's `resource_version` matches the stored
/// one; otherwise it fails with [`StoreError::Conflict`]. The store bumps
/// `resource_version` on every write and `generation` when the spec changed.
#[async_trait]
pub trait Collection<R: Resource>: Send + Sync {
    async fn get(&self, id: &Id<R::Marker>) -> Result<Option<R>>;

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<R>>;

    async fn create(&self, resource: R) -> Result<R>;

    async fn update(&self, resource: R) -> Result<R>;

    async fn delete(&self, id: &Id<R::Marker>) -> Result<()>;

    /// Subscribe to future changes of this kind.
    fn watch(&self) -> broadcast::Receiver<WatchEvent<R>>;
}

/// The full store: one collection per record kind.
pub trait Store: Send + Sync + 'static {
    fn container_builds(&self) -> &dyn Collection<ContainerBuild>;

    fn builds(&self) -> &dyn Collection<Build>;

    fn systems(&self) -> &dyn Collection<System>;

    fn deploys(&self) -> &dyn Collection<Deploy>;

    fn teardowns(&self) -> &dyn Collection<Teardown>;
}
