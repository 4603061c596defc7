// ABOUTME: Validated system definition version.
// ABOUTME: Versions are opaque labels such as git tags; only emptiness and whitespace are checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version cannot contain whitespace: {0:?}")]
    Whitespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    pub fn new(value: &str) -> Result<Self, VersionError> {
        if value.is_empty() {
            return Err(VersionError::Empty);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(VersionError::Whitespace(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
