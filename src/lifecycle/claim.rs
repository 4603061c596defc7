// ABOUTME: Exclusive lifecycle claim on a System, taken with optimistic conditional updates.
// ABOUTME: Only the claim holder may rewrite the System's desired spec.

use std::sync::Arc;

use super::error::{ClaimError, Result};
use crate::model::{ActionRef, LifecycleClaim, System, SystemSpec};
use crate::store::{Store, StoreError};
use crate::types::SystemId;

/// Result of trying to acquire a claim.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The requester holds the claim (possibly from an earlier sync).
    Acquired(System),
    /// Another action holds it; the requester waits.
    Held(ActionRef),
}

pub struct ClaimManager {
    store: Arc<dyn Store>,
    retries: u32,
}

impl ClaimManager {
    /// `retries` bounds how often a write conflict is retried in place before
    /// the caller backs off.
    pub fn new(store: Arc<dyn Store>, retries: u32) -> Self {
        Self { store, retries }
    }

    fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    async fn load(&self, system: &SystemId) -> Result<System> {
        self.store
            .systems()
            .get(system)
            .await?
            .ok_or_else(|| ClaimError::SystemNotFound {
                system: system.clone(),
            })
    }

    fn contended(&self, system: &SystemId) -> ClaimError {
        ClaimError::Contended {
            system: system.clone(),
            attempts: self.attempts(),
        }
    }

    pub async fn acquire(&self, system_id: &SystemId, action: &ActionRef) -> Result<ClaimOutcome> {
        for attempt in 1..=self.attempts() {
            let mut system = self.load(system_id).await?;
            if let Some(holder) = system.claimed_by() {
                if holder != action {
                    return Ok(ClaimOutcome::Held(holder.clone()));
                }
                return Ok(ClaimOutcome::Acquired(system));
            }

            system.claim = Some(LifecycleClaim::new(action.clone()));
            match self.store.systems().update(system).await {
                Ok(updated) => {
                    tracing::info!(system = %system_id, action = %action, "acquired lifecycle claim");
                    return Ok(ClaimOutcome::Acquired(updated));
                }
                Err(err) if err.is_conflict() => {
                    tracing::debug!(system = %system_id, action = %action, attempt, "claim write conflicted, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(self.contended(system_id))
    }

    /// Clear the claim if `action` holds it. Returns whether anything was released.
    pub async fn release(&self, system_id: &SystemId, action: &ActionRef) -> Result<bool> {
        for attempt in 1..=self.attempts() {
            let mut system = match self.load(system_id).await {
                Ok(system) => system,
                Err(ClaimError::SystemNotFound { .. }) => return Ok(false),
                Err(err) => return Err(err),
            };
            if system.claimed_by() != Some(action) {
                return Ok(false);
            }

            system.claim = None;
            match self.store.systems().update(system).await {
                Ok(_) => {
                    tracing::info!(system = %system_id, action = %action, "released lifecycle claim");
                    return Ok(true);
                }
                Err(err) if err.is_conflict() => {
                    tracing::debug!(system = %system_id, action = %action, attempt, "claim release conflicted, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(self.contended(system_id))
    }

    /// Rewrite the desired spec on behalf of the claim holder.
    ///
    /// The holder is re-verified on every attempt; a lost claim is reported as
    /// [`ClaimError::NotHolder`] and nothing is written.
    pub async fn apply_spec<F>(
        &self,
        system_id: &SystemId,
        action: &ActionRef,
        mutate: F,
    ) -> Result<System>
    where
        F: Fn(&mut SystemSpec) + Send + Sync,
    {
        for attempt in 1..=self.attempts() {
            let mut system = self.load(system_id).await?;
            if system.claimed_by() != Some(action) {
                return Err(ClaimError::NotHolder {
                    system: system_id.clone(),
                    action: action.clone(),
                });
            }

            mutate(&mut system.spec);
            match self.store.systems().update(system).await {
                Ok(updated) => {
                    tracing::info!(
                        system = %system_id,
                        action = %action,
                        generation = updated.meta.generation,
                        "wrote system spec"
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(system = %system_id, action = %action, attempt, "spec write conflicted, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(self.contended(system_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ClaimErrorKind;
    use crate::store::MemoryStore;
    use crate::types::{DeployId, TeardownId};

    async fn setup() -> (Arc<MemoryStore>, ClaimManager) {
        let store = Arc::new(MemoryStore::new());
        store
            .systems()
            .create(System::new(SystemId::new("petstore")))
            .await
            .unwrap();
        let claims = ClaimManager::new(Arc::clone(&store) as Arc<dyn Store>, 3);
        (store, claims)
    }

    fn deploy(id: &str) -> ActionRef {
        ActionRef::Deploy(DeployId::new(id))
    }

    #[tokio::test]
    async fn second_action_sees_first_holder() {
        let (_store, claims) = setup().await;
        let system = SystemId::new("petstore");

        let first = claims.acquire(&system, &deploy("d1")).await.unwrap();
        assert!(matches!(first, ClaimOutcome::Acquired(_)));

        let second = claims
            .acquire(&system, &ActionRef::Teardown(TeardownId::new("t1")))
            .await
            .unwrap();
        assert!(matches!(second, ClaimOutcome::Held(ref holder) if *holder == deploy("d1")));
    }

    #[tokio::test]
    async fn acquire_is_idempotent_for_holder() {
        let (_store, claims) = setup().await;
        let system = SystemId::new("petstore");
        claims.acquire(&system, &deploy("d1")).await.unwrap();
        let again = claims.acquire(&system, &deploy("d1")).await.unwrap();
        assert!(matches!(again, ClaimOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn release_only_by_holder() {
        let (store, claims) = setup().await;
        let system = SystemId::new("petstore");
        claims.acquire(&system, &deploy("d1")).await.unwrap();

        assert!(!claims.release(&system, &deploy("d2")).await.unwrap());
        assert!(claims.release(&system, &deploy("d1")).await.unwrap());
        assert!(!claims.release(&system, &deploy("d1")).await.unwrap());

        let stored = store.systems().get(&system).await.unwrap().unwrap();
        assert!(stored.claim.is_none());
    }

    #[tokio::test]
    async fn spec_writes_require_the_claim() {
        let (store, claims) = setup().await;
        let system = SystemId::new("petstore");

        let err = claims
            .apply_spec(&system, &deploy("d1"), |spec| spec.build = None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ClaimErrorKind::NotHolder);

        claims.acquire(&system, &deploy("d1")).await.unwrap();
        let before = store.systems().get(&system).await.unwrap().unwrap();
        let updated = claims
            .apply_spec(&system, &deploy("d1"), |spec| {
                spec.version = Some(crate::types::Version::new("v2").unwrap())
            })
            .await
            .unwrap();
        assert_eq!(updated.meta.generation, before.meta.generation + 1);
    }

    #[tokio::test]
    async fn missing_system_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let claims = ClaimManager::new(store as Arc<dyn Store>, 3);
        let err = claims
            .acquire(&SystemId::new("nope"), &deploy("d1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ClaimErrorKind::SystemNotFound);
    }
}
