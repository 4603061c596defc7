// ABOUTME: Teardown controller - clears a System's desired services under the lifecycle claim.
// ABOUTME: Pending -> InProgress -> Succeeded (system stable) or Failed (system degraded).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::claim::{ClaimManager, ClaimOutcome};
use super::error::ClaimError;
use super::{Rollout, rollout};
use crate::controller::driver::Reconciler;
use crate::controller::error::{ReconcileError, Result};
use crate::model::{ActionRef, ResourceKind, Teardown, TeardownState};
use crate::store::Store;
use crate::types::TeardownId;

pub struct TeardownController {
    store: Arc<dyn Store>,
    claims: ClaimManager,
}

impl TeardownController {
    pub fn new(store: Arc<dyn Store>, claim_retries: u32) -> Self {
        let claims = ClaimManager::new(Arc::clone(&store), claim_retries);
        Self { store, claims }
    }

    async fn pending(&self, mut teardown: Teardown) -> Result<()> {
        let system_id = teardown.spec.system.clone();
        let action = ActionRef::Teardown(teardown.meta.id.clone());

        match self.claims.acquire(&system_id, &action).await {
            Ok(ClaimOutcome::Acquired(_)) => {}
            Ok(ClaimOutcome::Held(holder)) => {
                tracing::debug!(teardown = %teardown.meta.id, system = %system_id, holder = %holder, "waiting for lifecycle claim");
                return Ok(());
            }
            Err(ClaimError::SystemNotFound { .. }) => {
                let message = format!("System {system_id} not found");
                return self.finish(teardown, TeardownState::Failed, Some(message)).await;
            }
            Err(err) => return Err(err.into()),
        }

        let written = self
            .claims
            .apply_spec(&system_id, &action, |spec| {
                spec.services.clear();
                spec.jobs.clear();
                spec.build = None;
                spec.version = None;
            })
            .await;
        let system = match written {
            Ok(system) => system,
            Err(ClaimError::SystemNotFound { .. }) => {
                let message = format!("System {system_id} not found");
                return self.finish(teardown, TeardownState::Failed, Some(message)).await;
            }
            Err(err) => return Err(err.into()),
        };

        let id = teardown.meta.id.clone();
        teardown.status.state = TeardownState::InProgress;
        teardown.status.system_generation = Some(system.meta.generation);
        teardown.status.observed_generation = teardown.meta.generation;
        self.store.teardowns().update(teardown).await?;
        tracing::info!(teardown = %id, system = %system_id, generation = system.meta.generation, "tearing down system");
        Ok(())
    }

    async fn in_progress(&self, teardown: Teardown) -> Result<()> {
        let Some(generation) = teardown.status.system_generation else {
            return Err(ReconcileError::invariant(format!(
                "teardown {} is in progress without a system generation",
                teardown.meta.id
            )));
        };
        let Some(system) = self.store.systems().get(&teardown.spec.system).await? else {
            let message = format!("System {} not found", teardown.spec.system);
            return self.finish(teardown, TeardownState::Failed, Some(message)).await;
        };

        match rollout(&system, generation) {
            Rollout::Waiting => Ok(()),
            Rollout::Stable => self.finish(teardown, TeardownState::Succeeded, None).await,
            Rollout::Degraded(message) => {
                self.finish(teardown, TeardownState::Failed, Some(message)).await
            }
        }
    }

    async fn finish(
        &self,
        mut teardown: Teardown,
        state: TeardownState,
        message: Option<String>,
    ) -> Result<()> {
        teardown.status.state = state;
        teardown.status.message = message;
        teardown.status.completed_at = Some(Utc::now());
        teardown.status.observed_generation = teardown.meta.generation;
        let teardown = self.store.teardowns().update(teardown).await?;
        tracing::info!(teardown = %teardown.meta.id, system = %teardown.spec.system, state = %state, "teardown finished");
        self.release(&teardown).await
    }

    async fn release(&self, teardown: &Teardown) -> Result<()> {
        let action = ActionRef::Teardown(teardown.meta.id.clone());
        self.claims.release(&teardown.spec.system, &action).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for TeardownController {
    type Key = TeardownId;

    const KIND: ResourceKind = ResourceKind::Teardown;

    async fn sync(&self, id: &TeardownId) -> Result<()> {
        let Some(teardown) = self.store.teardowns().get(id).await? else {
            tracing::debug!(teardown = %id, "teardown no longer exists");
            return Ok(());
        };

        match teardown.status.state {
            TeardownState::Pending => self.pending(teardown).await,
            TeardownState::InProgress => self.in_progress(teardown).await,
            TeardownState::Succeeded | TeardownState::Failed => self.release(&teardown).await,
        }
    }
}
