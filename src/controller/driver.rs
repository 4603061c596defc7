// ABOUTME: Generic reconciliation driver: a work queue drained by a fixed worker pool.
// ABOUTME: Failed syncs are requeued with backoff; repeated or invariant failures are surfaced.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::error::{ReconcileError, ReconcileErrorKind};
use super::queue::WorkQueue;
use crate::diagnostics::{Diagnostics, Warning};
use crate::model::ResourceKind;

/// Per-kind reconciliation logic.
///
/// `sync` must be level-triggered: a pure function of the current stored state
/// to the next write, safe to run redundantly and out of order.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;

    const KIND: ResourceKind;

    async fn sync(&self, key: &Self::Key) -> Result<(), ReconcileError>;
}

/// A reconciler bound to its queue.
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<R::Key>>,
    diagnostics: Arc<Diagnostics>,
    alert_threshold: u32,
}

impl<R: Reconciler> Clone for Controller<R> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            queue: Arc::clone(&self.queue),
            diagnostics: Arc::clone(&self.diagnostics),
            alert_threshold: self.alert_threshold,
        }
    }
}

impl<R: Reconciler> Controller<R> {
    pub fn new(
        reconciler: Arc<R>,
        queue: Arc<WorkQueue<R::Key>>,
        diagnostics: Arc<Diagnostics>,
        alert_threshold: u32,
    ) -> Self {
        Self {
            reconciler,
            queue,
            diagnostics,
            alert_threshold,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<R::Key>> {
        &self.queue
    }

    /// Start `workers` loops on `set`. They exit when the queue shuts down.
    pub fn spawn_workers(&self, workers: usize, set: &mut JoinSet<()>) {
        for worker in 0..workers.max(1) {
            let controller = self.clone();
            set.spawn(async move { controller.worker_loop(worker).await });
        }
    }

    async fn worker_loop(self, worker: usize) {
        tracing::debug!(kind = %R::KIND, worker, "worker started");
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key);
        }
        tracing::debug!(kind = %R::KIND, worker, "worker stopped");
    }

    /// Run one sync for `key` and apply the retry policy to its outcome.
    pub async fn process(&self, key: &R::Key) {
        let span = tracing::debug_span!("sync", kind = %R::KIND, key = %key);
        let result = self.reconciler.sync(key).instrument(span).await;

        let err = match result {
            Ok(()) => {
                self.queue.forget(key);
                return;
            }
            Err(err) => err,
        };

        let failures = self.queue.failures(key) + 1;
        match err.kind() {
            ReconcileErrorKind::Conflict => {
                tracing::debug!(kind = %R::KIND, key = %key, failures, "sync conflict: {err}");
            }
            ReconcileErrorKind::Transient => {
                tracing::warn!(kind = %R::KIND, key = %key, failures, "sync failed: {err}");
            }
            ReconcileErrorKind::Invariant => {
                tracing::error!(kind = %R::KIND, key = %key, failures, "invariant violated: {err}");
                self.diagnostics.warn(Warning::invariant_violation(
                    R::KIND,
                    key.to_string(),
                    err.to_string(),
                ));
            }
        }

        if failures == self.alert_threshold {
            self.diagnostics.warn(Warning::repeated_failure(
                R::KIND,
                key.to_string(),
                format!("failed {failures} times in a row, last error: {err}"),
            ));
        }

        self.queue.add_rate_limited(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::Backoff;
    use crate::diagnostics::WarningKind;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Flaky {
        calls: Mutex<Vec<String>>,
        fail_with: Option<fn() -> ReconcileError>,
    }

    #[async_trait]
    impl Reconciler for Flaky {
        type Key = String;

        const KIND: ResourceKind = ResourceKind::Build;

        async fn sync(&self, key: &String) -> Result<(), ReconcileError> {
            self.calls.lock().push(key.clone());
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn controller(fail_with: Option<fn() -> ReconcileError>) -> Controller<Flaky> {
        let queue = Arc::new(WorkQueue::new(
            "test",
            Backoff::new(Duration::from_secs(60), Duration::from_secs(60)),
        ));
        Controller::new(
            Arc::new(Flaky {
                calls: Mutex::new(Vec::new()),
                fail_with,
            }),
            queue,
            Arc::new(Diagnostics::default()),
            2,
        )
    }

    #[tokio::test]
    async fn success_clears_failure_history() {
        let controller = controller(None);
        let key = "b1".to_string();
        controller.queue().add_rate_limited(key.clone());
        assert_eq!(controller.queue().failures(&key), 1);

        controller.process(&key).await;
        assert_eq!(controller.queue().failures(&key), 0);
    }

    #[tokio::test]
    async fn invariant_failures_are_recorded() {
        let controller = controller(Some(|| ReconcileError::invariant("bad state")));
        let key = "b1".to_string();

        controller.process(&key).await;
        controller.process(&key).await;

        assert_eq!(controller.queue().failures(&key), 2);
        let warnings = controller.diagnostics.warnings();
        assert!(warnings.iter().any(|w| w.kind == WarningKind::InvariantViolation));
        assert!(warnings.iter().any(|w| w.kind == WarningKind::RepeatedFailure));
    }

    #[tokio::test]
    async fn workers_drain_queue_and_stop_on_shutdown() {
        let controller = controller(None);
        for i in 0..10 {
            controller.queue().add(format!("b{i}"));
        }

        let mut set = JoinSet::new();
        controller.spawn_workers(4, &mut set);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !controller.queue().is_idle() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue should drain");

        controller.queue().shut_down();
        while set.join_next().await.is_some() {}
        assert_eq!(controller.reconciler.calls.lock().len(), 10);
    }
}
