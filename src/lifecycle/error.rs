// ABOUTME: Error types for lifecycle claim operations.
// ABOUTME: Distinguishes contention, lost claims and store failures.

use thiserror::Error;

use crate::model::ActionRef;
use crate::store::StoreError;
use crate::types::SystemId;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("system {system} not found")]
    SystemNotFound { system: SystemId },

    #[error("system {system} kept changing underneath {attempts} claim attempts")]
    Contended { system: SystemId, attempts: u32 },

    #[error("{action} does not hold the lifecycle claim on system {system}")]
    NotHolder { system: SystemId, action: ActionRef },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimErrorKind {
    Contended,
    Store,
    SystemNotFound,
    NotHolder,
}

impl ClaimError {
    pub fn kind(&self) -> ClaimErrorKind {
        match self {
            ClaimError::SystemNotFound { .. } => ClaimErrorKind::SystemNotFound,
            ClaimError::Contended { .. } => ClaimErrorKind::Contended,
            ClaimError::NotHolder { .. } => ClaimErrorKind::NotHolder,
            ClaimError::Store(_) => ClaimErrorKind::Store,
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            ClaimError::Store(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
