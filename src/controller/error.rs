// ABOUTME: Reconcile error types with SNAFU pattern.
// ABOUTME: Unifies component errors and classifies them for the driver's retry and alerting path.

use snafu::Snafu;

use crate::lifecycle::{ClaimError, ClaimErrorKind};
use crate::resolver::ResolveError;
use crate::store::StoreError;
use crate::system::AggregateError;
use crate::types::HashError;

/// Error returned by a controller's sync function. Every variant leads to a
/// rate-limited requeue; none of them crash the worker.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconcileError {
    #[snafu(display("store operation failed: {source}"))]
    Store { source: StoreError },

    #[snafu(display("lifecycle claim failed: {source}"))]
    Claim { source: ClaimError },

    #[snafu(display("definition resolution failed: {source}"))]
    Resolve { source: ResolveError },

    #[snafu(display("content hashing failed: {source}"))]
    Hash { source: HashError },

    #[snafu(display("status aggregation failed: {source}"))]
    Aggregate { source: AggregateError },

    #[snafu(display("invariant violated: {message}"))]
    Invariant { message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileErrorKind {
    /// Store hiccup; retry quietly.
    Transient,
    /// Lost an optimistic-concurrency race; re-read and retry.
    Conflict,
    /// A state combination that should not occur. Retried, but loud.
    Invariant,
}

impl ReconcileError {
    pub fn invariant(message: impl Into<String>) -> Self {
        ReconcileError::Invariant {
            message: message.into(),
        }
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ReconcileErrorKind {
        match self {
            ReconcileError::Store { source } => store_kind(source),
            ReconcileError::Claim { source } => match source.kind() {
                ClaimErrorKind::Contended => ReconcileErrorKind::Conflict,
                ClaimErrorKind::Store => match source.store_error() {
                    Some(err) => store_kind(err),
                    None => ReconcileErrorKind::Transient,
                },
                ClaimErrorKind::SystemNotFound => ReconcileErrorKind::Transient,
                ClaimErrorKind::NotHolder => ReconcileErrorKind::Invariant,
            },
            ReconcileError::Resolve { .. } => ReconcileErrorKind::Transient,
            ReconcileError::Hash { .. }
            | ReconcileError::Aggregate { .. }
            | ReconcileError::Invariant { .. } => ReconcileErrorKind::Invariant,
        }
    }
}

fn store_kind(err: &StoreError) -> ReconcileErrorKind {
    if err.is_conflict() {
        ReconcileErrorKind::Conflict
    } else {
        ReconcileErrorKind::Transient
    }
}

impl From<StoreError> for ReconcileError {
    fn from(source: StoreError) -> Self {
        ReconcileError::Store { source }
    }
}

impl From<ClaimError> for ReconcileError {
    fn from(source: ClaimError) -> Self {
        ReconcileError::Claim { source }
    }
}

impl From<ResolveError> for ReconcileError {
    fn from(source: ResolveError) -> Self {
        ReconcileError::Resolve { source }
    }
}

impl From<HashError> for ReconcileError {
    fn from(source: HashError) -> Self {
        ReconcileError::Hash { source }
    }
}

impl From<AggregateError> for ReconcileError {
    fn from(source: AggregateError) -> Self {
        ReconcileError::Aggregate { source }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
