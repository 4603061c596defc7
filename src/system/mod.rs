// ABOUTME: System controller - keeps the aggregate System state in line with per-service status.
// ABOUTME: Marks each spec generation as processed once it has been aggregated.

mod status;

use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::driver::Reconciler;
use crate::controller::error::Result;
use crate::model::ResourceKind;
use crate::store::Store;
use crate::types::SystemId;

pub use status::{aggregate, next_status, AggregateError};

pub struct SystemController {
    store: Arc<dyn Store>,
}

impl SystemController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Reconciler for SystemController {
    type Key = SystemId;

    const KIND: ResourceKind = ResourceKind::System;

    async fn sync(&self, id: &SystemId) -> Result<()> {
        let Some(system) = self.store.systems().get(id).await? else {
            tracing::debug!(system = %id, "system no longer exists");
            return Ok(());
        };

        let status = next_status(&system)?;
        if status == system.status {
            return Ok(());
        }

        let previous = system.status.state;
        let mut updated = system;
        updated.status = status;
        let updated = self.store.systems().update(updated).await?;

        if updated.status.state != previous {
            tracing::info!(
                system = %id,
                from = %previous,
                to = %updated.status.state,
                generation = updated.status.observed_generation,
                "system state changed"
            );
        }
        Ok(())
    }
}
