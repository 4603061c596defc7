// ABOUTME: Hash command implementation.
// ABOUTME: Prints the dedup key the build controller would use for a definition.

use keel::config::Config;
use keel::error::Result;
use keel::model::ContainerBuildDefinition;
use keel::types::ContentHash;
use std::path::Path;

pub fn hash(path: &Path, config: &Config) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let definition: ContainerBuildDefinition = serde_yaml::from_str(&content)?;
    let hash = ContentHash::compute(&definition, config.content_hash_width)?;
    println!("{hash}");
    Ok(())
}
