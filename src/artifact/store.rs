//! Canonical-path writes with an exclusive advisory lock, plus symbolic
//! entity-view references.
//!
//! Grounded on `store/investigation_store.rs`'s open-or-create connection
//! pattern, adapted from SQLite rows to plain files; locking itself is
//! `fs2`'s `FileExt`, the same crate a mail-agent repo in the reference
//! pack pulls in for this exact purpose.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

use crate::artifact::paths::ArtifactPaths;
use crate::error::{Error, Result};

pub struct ArtifactStore;

impl ArtifactStore {
    /// Write `contents` to `paths.canonical` under an exclusive advisory
    /// lock held for the duration of the write, then create/refresh the
    /// entity-view symbolic reference pointing at it. Readers never lock.
    pub fn write(paths: &ArtifactPaths, contents: &[u8]) -> Result<()> {
        if let Some(parent) = paths.canonical.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&paths.canonical)
            .map_err(|e| Error::Storage(e.to_string()))?;

        file.lock_exclusive().map_err(|e| Error::Storage(format!("failed to lock {:?}: {e}", paths.canonical)))?;
        let result = write_locked(&file, contents);
        let _ = file.unlock();
        result?;

        Self::link_entity_view(paths)
    }

    /// Create the entity-view symbolic reference for an already-written
    /// canonical artifact. Errors if the canonical path doesn't exist yet.
    pub fn link_entity_view(paths: &ArtifactPaths) -> Result<()> {
        if !paths.canonical.exists() {
            return Err(Error::Storage(format!(
                "cannot create entity view: canonical artifact {:?} does not exist",
                paths.canonical
            )));
        }
        if let Some(parent) = paths.entity_view.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }

        replace_symlink(&paths.canonical, &paths.entity_view)
    }

    pub fn read_canonical(path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::Storage(e.to_string()))
    }
}

fn write_locked(file: &File, contents: &[u8]) -> Result<()> {
    let mut file = file;
    file.write_all(contents).map_err(|e| Error::Storage(e.to_string()))?;
    file.flush().map_err(|e| Error::Storage(e.to_string()))?;
    Ok(())
}

#[cfg(unix)]
fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if link.exists() || link.symlink_metadata().is_ok() {
        fs::remove_file(link).map_err(|e| Error::Storage(e.to_string()))?;
    }
    let absolute_target = fs::canonicalize(target).map_err(|e| Error::Storage(e.to_string()))?;
    std::os::unix::fs::symlink(&absolute_target, link).map_err(|e| Error::Storage(e.to_string()))
}

#[cfg(not(unix))]
fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if link.exists() {
        fs::remove_file(link).map_err(|e| Error::Storage(e.to_string()))?;
    }
    fs::copy(target, link).map_err(|e| Error::Storage(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_paths(root: &Path) -> ArtifactPaths {
        crate::artifact::paths::resolve_investigation_artifact_path(
            root,
            "inv-1",
            &crate::entity::Entity::new(crate::entity::EntityType::Email, "a@b.com").unwrap(),
            "comparison",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn write_creates_canonical_and_entity_view() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(dir.path());

        ArtifactStore::write(&paths, b"{\"ok\":true}").unwrap();

        assert!(paths.canonical.exists());
        #[cfg(unix)]
        assert!(paths.entity_view.symlink_metadata().is_ok());

        let contents = ArtifactStore::read_canonical(&paths.canonical).unwrap();
        assert_eq!(contents, b"{\"ok\":true}");
    }

    #[test]
    fn linking_view_without_canonical_errors() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(dir.path());
        assert!(ArtifactStore::link_entity_view(&paths).is_err());
    }
}
