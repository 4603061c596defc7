// ABOUTME: Object metadata shared by every stored record.
// ABOUTME: Identity, write version, spec generation, labels and owner references.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Id;

/// Kinds of records exchanged with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ContainerBuild,
    Build,
    System,
    Deploy,
    Teardown,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::ContainerBuild => "container-build",
            ResourceKind::Build => "build",
            ResourceKind::System => "system",
            ResourceKind::Deploy => "deploy",
            ResourceKind::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Reference to the record that created (and shares ownership of) another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl OwnerRef {
    pub fn new<T>(kind: ResourceKind, id: &Id<T>) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

/// Metadata maintained by the store.
///
/// `resource_version` increases on every write and is the optimistic
/// concurrency token. `generation` increases only when the spec changes, so
/// status writers can record which spec they last processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ObjectMeta<M> {
    pub id: Id<M>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owners: Vec<OwnerRef>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl<M> ObjectMeta<M> {
    pub fn new(id: Id<M>) -> Self {
        Self {
            id,
            resource_version: 0,
            generation: 0,
            labels: BTreeMap::new(),
            owners: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owners.push(owner);
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// A record kind the store can hold.
pub trait Resource: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Marker: Send + Sync + 'static;

    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta<Self::Marker>;

    fn meta_mut(&mut self) -> &mut ObjectMeta<Self::Marker>;

    /// Whether `self` carries a different spec than `previous`.
    /// The store bumps `generation` exactly when this returns true.
    fn spec_differs(&self, previous: &Self) -> bool;

    fn id(&self) -> &Id<Self::Marker> {
        &self.meta().id
    }
}

/// Equality selector over labels; an empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    required: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.required.insert(key.to_string(), value.into());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.required
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selector_matches_everything() {
        let labels = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert!(LabelSelector::everything().matches(&labels));
        assert!(LabelSelector::everything().matches(&BTreeMap::new()));
    }

    #[test]
    fn selector_requires_every_label() {
        let labels = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert!(LabelSelector::default().with("a", "1").matches(&labels));
        assert!(!LabelSelector::default().with("a", "1").with("c", "3").matches(&labels));
        assert!(!LabelSelector::default().with("b", "1").matches(&labels));
    }
}
