// ABOUTME: Application-wide error types for keel.
// ABOUTME: Uses thiserror for ergonomic error handling in the config and CLI layers.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;
use crate::types::HashError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("scenario did not settle within {0:?}")]
    Timeout(Duration),

    #[error("{failed} of {total} actions did not succeed")]
    ActionsFailed { failed: usize, total: usize },

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
