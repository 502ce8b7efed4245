//! Investigation artifact persistence: canonical path +
//! entity-view path resolution, file-locked writes, and the append-only
//! workspace registry that indexes both.

pub mod paths;
pub mod registry;
pub mod store;

pub use paths::{resolve_investigation_artifact_path, ArtifactPaths};
pub use registry::{ArtifactRecord, WorkspaceRegistry};
pub use store::ArtifactStore;
