// ABOUTME: Diagnostics accumulator for non-fatal controller problems.
// ABOUTME: Collects warnings that must not crash a controller but should be visible to operators.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::model::ResourceKind;

/// Upper bound on retained warnings; older ones are discarded first.
const MAX_WARNINGS: usize = 1000;

/// Collects non-fatal warnings from all controllers. Shared behind an `Arc`.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Mutex<Vec<Warning>>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, resource = %warning.resource, key = %warning.key, "{}", warning.message);
        let mut warnings = self.warnings.lock();
        if warnings.len() >= MAX_WARNINGS {
            warnings.remove(0);
        }
        warnings.push(warning);
    }

    /// Snapshot of all collected warnings.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.lock().is_empty()
    }
}

/// A non-fatal warning collected while reconciling.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub resource: ResourceKind,
    pub key: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Warning {
    fn new(kind: WarningKind, resource: ResourceKind, key: String, message: String) -> Self {
        Self {
            kind,
            resource,
            key,
            message,
            at: Utc::now(),
        }
    }

    /// A sync observed a state combination it does not recognize.
    pub fn invariant_violation(resource: ResourceKind, key: String, message: String) -> Self {
        Self::new(WarningKind::InvariantViolation, resource, key, message)
    }

    /// A key kept failing past the alert threshold.
    pub fn repeated_failure(resource: ResourceKind, key: String, message: String) -> Self {
        Self::new(WarningKind::RepeatedFailure, resource, key, message)
    }

    /// A background task stopped abnormally (panicked or was cancelled).
    pub fn task_failed(resource: ResourceKind, task: &str, message: String) -> Self {
        Self::new(WarningKind::TaskFailed, resource, task.to_string(), message)
    }

    /// A watch stream dropped events and the kind had to be re-listed.
    pub fn watch_lagged(resource: ResourceKind, skipped: u64) -> Self {
        Self::new(
            WarningKind::WatchLagged,
            resource,
            String::new(),
            format!("watch fell behind by {skipped} events, re-listing"),
        )
    }
}

/// Categories of warnings that can occur while reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// Sync returned an invariant error.
    InvariantViolation,
    /// Same key failed repeatedly.
    RepeatedFailure,
    /// Notifications were lost; recovered by re-list.
    WatchLagged,
    /// A background task panicked or was cancelled.
    TaskFailed,
}
