// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod content_hash;
mod id;
mod service_path;
mod version;

pub use content_hash::{ContentHash, HashError, HashWidth, MAX_HASH_WIDTH, MIN_HASH_WIDTH};
pub use id::{
    BuildId, BuildMarker, ContainerBuildId, ContainerBuildMarker, DeployId, DeployMarker, Id,
    SystemId, SystemMarker, TeardownId, TeardownMarker,
};
pub use service_path::{ServicePath, ServicePathError};
pub use version::{Version, VersionError};
