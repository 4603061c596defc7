// ABOUTME: Validated service and job paths within a system topology.
// ABOUTME: Paths are absolute and made of RFC 1123 label components.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServicePathError {
    #[error("service path cannot be empty")]
    Empty,

    #[error("service path must start with '/': {0}")]
    NotAbsolute(String),

    #[error("service path has an empty component: {0}")]
    EmptyComponent(String),

    #[error("path component exceeds maximum length of 63 characters: {0}")]
    ComponentTooLong(String),

    #[error("path component cannot start or end with a hyphen: {0}")]
    HyphenEdge(String),

    #[error("invalid character in service path: '{0}'")]
    InvalidChar(char),
}

/// Absolute path of a service or job inside a system, e.g. `/petstore/api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServicePath(String);

impl ServicePath {
    pub fn new(value: &str) -> Result<Self, ServicePathError> {
        if value.is_empty() {
            return Err(ServicePathError::Empty);
        }

        let Some(rest) = value.strip_prefix('/') else {
            return Err(ServicePathError::NotAbsolute(value.to_string()));
        };

        for component in rest.split('/') {
            validate_component(component, value)?;
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Components of the path, without the leading separator.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// The final component, used as the short name of the service.
    pub fn name(&self) -> &str {
        self.components().last().unwrap_or_default()
    }
}

fn validate_component(component: &str, path: &str) -> Result<(), ServicePathError> {
    if component.is_empty() {
        return Err(ServicePathError::EmptyComponent(path.to_string()));
    }

    if component.len() > 63 {
        return Err(ServicePathError::ComponentTooLong(component.to_string()));
    }

    if component.starts_with('-') || component.ends_with('-') {
        return Err(ServicePathError::HyphenEdge(component.to_string()));
    }

    for c in component.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(ServicePathError::InvalidChar(c));
        }
    }

    Ok(())
}

impl TryFrom<String> for ServicePath {
    type Error = ServicePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ServicePath> for String {
    fn from(path: ServicePath) -> Self {
        path.0
    }
}

impl fmt::Display for ServicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
