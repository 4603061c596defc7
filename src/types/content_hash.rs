// ABOUTME: Content hashing of normalized build definitions.
// ABOUTME: SHA-256 over canonical JSON, hex encoded and truncated to a configurable width.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Smallest accepted hash width in hex characters.
pub const MIN_HASH_WIDTH: usize = 8;

/// Largest accepted hash width. Label values are limited to 63 characters.
pub const MAX_HASH_WIDTH: usize = 63;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash width must be between {MIN_HASH_WIDTH} and {MAX_HASH_WIDTH}, got {0}")]
    InvalidWidth(usize),

    #[error("failed to normalize definition: {0}")]
    Normalize(#[from] serde_json::Error),
}

/// Number of hex characters kept from the full digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashWidth(usize);

impl HashWidth {
    pub fn new(width: usize) -> Result<Self, HashError> {
        if !(MIN_HASH_WIDTH..=MAX_HASH_WIDTH).contains(&width) {
            return Err(HashError::InvalidWidth(width));
        }
        Ok(Self(width))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for HashWidth {
    fn default() -> Self {
        Self(32)
    }
}

/// Identity of a build definition. Equal definitions always hash equally;
/// distinct definitions that collide after truncation are treated as equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Normalize `definition` and hash it.
    ///
    /// Normalization goes through `serde_json::Value`, whose maps are sorted,
    /// so field and map-entry order never affect the result.
    pub fn compute<T: Serialize>(definition: &T, width: HashWidth) -> Result<Self, HashError> {
        let normalized = serde_json::to_value(definition)?;
        let bytes = serde_json::to_vec(&normalized)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(width.get());

        Ok(Self(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn width_is_validated() {
        assert!(HashWidth::new(7).is_err());
        assert!(HashWidth::new(64).is_err());
        assert_eq!(HashWidth::new(8).unwrap().get(), 8);
    }

    #[test]
    fn hash_is_truncated_to_width() {
        let hash = ContentHash::compute(&"definition", HashWidth::new(12).unwrap()).unwrap();
        assert_eq!(hash.as_str().len(), 12);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn map_order_does_not_change_hash() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for i in 0..16 {
            a.insert(format!("k{i}"), i);
        }
        for i in (0..16).rev() {
            b.insert(format!("k{i}"), i);
        }
        let width = HashWidth::default();
        assert_eq!(
            ContentHash::compute(&a, width).unwrap(),
            ContentHash::compute(&b, width).unwrap()
        );
    }
}
