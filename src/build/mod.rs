// ABOUTME: Build controller - resolves a Build's containers and aggregates their status.
// ABOUTME: Container builds are shared across Builds through content-hash dedup.

mod cache;
mod guard;
mod status;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::controller::driver::Reconciler;
use crate::controller::error::Result;
use crate::controller::index::ReferenceIndex;
use crate::model::ResourceKind;
use crate::store::Store;
use crate::types::{BuildId, ContainerBuildId, HashWidth};

pub use cache::{ContainerBuildCache, ResolvedContainers};
pub use guard::{RecentCreationGuard, Reservation};
pub use status::{aggregate_state, next_status};

pub struct BuildController {
    store: Arc<dyn Store>,
    cache: ContainerBuildCache,
}

impl BuildController {
    pub fn new(
        store: Arc<dyn Store>,
        dependents: Arc<ReferenceIndex<ContainerBuildId, BuildId>>,
        hash_width: HashWidth,
    ) -> Self {
        let cache = ContainerBuildCache::new(Arc::clone(&store), dependents, hash_width);
        Self { store, cache }
    }

    pub fn cache(&self) -> &ContainerBuildCache {
        &self.cache
    }
}

#[async_trait]
impl Reconciler for BuildController {
    type Key = BuildId;

    const KIND: ResourceKind = ResourceKind::Build;

    async fn sync(&self, id: &BuildId) -> Result<()> {
        let Some(build) = self.store.builds().get(id).await? else {
            tracing::debug!(build = %id, "build no longer exists");
            return Ok(());
        };

        if build.status.state.is_terminal() && build.status_is_current() {
            return Ok(());
        }

        let resolved = self.cache.resolve(&build).await?;
        let status = next_status(&build, &resolved, Utc::now());
        if status == build.status {
            return Ok(());
        }

        let previous = build.status.state;
        let mut updated = build;
        updated.status = status;
        let updated = self.store.builds().update(updated).await?;

        if updated.status.state != previous {
            tracing::info!(
                build = %id,
                from = ?previous,
                to = ?updated.status.state,
                "build state changed"
            );
        }
        Ok(())
    }
}
