// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates content hash widths while parsing.

use serde::Deserialize;

use crate::types::HashWidth;

pub fn deserialize_hash_width<'de, D>(deserializer: D) -> Result<HashWidth, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let width = usize::deserialize(deserializer)?;
    HashWidth::new(width).map_err(serde::de::Error::custom)
}
