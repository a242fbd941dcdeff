//! Filesystem Adapter: the merges working directory lifecycle.
//!
//! Directory creation and cleanup are real (`std::fs`) — the merges
//! directory is just a plain directory under the host's region storage
//! layout, and there's nothing out-of-scope about creating or removing
//! one. The one thing that *is* out of scope is the actual store-file
//! format: "materialize a reference to a source store file" is a single
//! trait method, [`StoreFileLinker`], since the real store-file layout
//! lives in a part of the system this crate doesn't own.

use std::fs;
use std::path::{Path, PathBuf};

use crate::model::region::MergedRegionDescriptor;

#[derive(Debug)]
pub struct FilesystemError(pub String);

impl std::fmt::Display for FilesystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "filesystem error: {}", self.0)
    }
}

impl std::error::Error for FilesystemError {}

impl From<std::io::Error> for FilesystemError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Materializes a reference to a source region's store file under the
/// merges directory. Out of scope: the actual store-file format.
///
/// # Invariants
/// - `link` never copies file bytes; it records a pointer the merged
///   region can later resolve back to the original store file.
pub trait StoreFileLinker {
    fn link(
        &self,
        family_name: &str,
        source_store_file: &Path,
        merges_dir: &Path,
    ) -> Result<PathBuf, FilesystemError>;
}

/// Real directory lifecycle for the merges working directory, which lives
/// under region A's region directory (region A is always the
/// lexicographically smaller of the pair — see [`crate::model::region`]).
pub struct FilesystemAdapter {
    region_storage_root: PathBuf,
}

impl FilesystemAdapter {
    #[must_use]
    pub const fn new(region_storage_root: PathBuf) -> Self {
        Self {
            region_storage_root,
        }
    }

    #[must_use]
    pub fn region_dir(&self, encoded_name: &str) -> PathBuf {
        self.region_storage_root.join(encoded_name)
    }

    #[must_use]
    pub fn merges_dir(&self, region_a_encoded_name: &str) -> PathBuf {
        self.region_dir(region_a_encoded_name).join(".merges")
    }

    /// Create the merges directory for a transaction. Idempotent: an
    /// already-existing directory is not an error (recovery may retry
    /// this step).
    ///
    /// # Errors
    /// Returns [`FilesystemError`] on any I/O failure other than
    /// already-exists.
    pub fn create_merges_dir(&self, region_a_encoded_name: &str) -> Result<PathBuf, FilesystemError> {
        let dir = self.merges_dir(region_a_encoded_name);
        match fs::create_dir_all(&dir) {
            Ok(()) => Ok(dir),
            Err(e) => Err(FilesystemError(format!("create {}: {e}", dir.display()))),
        }
    }

    /// Remove the merges directory and everything under it. Idempotent.
    ///
    /// # Errors
    /// Returns [`FilesystemError`] on any I/O failure other than
    /// not-found.
    pub fn cleanup_merges_dir(&self, region_a_encoded_name: &str) -> Result<(), FilesystemError> {
        let dir = self.merges_dir(region_a_encoded_name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesystemError(format!("remove {}: {e}", dir.display()))),
        }
    }

    /// Remove a merged region's directory. Used by rollback to undo
    /// [`crate::journal::JournalStage::StartedMergedRegionCreation`].
    ///
    /// # Errors
    /// Returns [`FilesystemError`] on any I/O failure other than
    /// not-found.
    pub fn cleanup_merged_region_dir(
        &self,
        merged: &MergedRegionDescriptor,
    ) -> Result<(), FilesystemError> {
        let dir = self.region_dir(merged.encoded_name().as_str());
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesystemError(format!("remove {}: {e}", dir.display()))),
        }
    }

    /// A unique scratch subpath under `merges_dir`, safe to use when
    /// multiple store files share a family name.
    #[must_use]
    pub fn scratch_subpath(merges_dir: &Path, family_name: &str) -> PathBuf {
        let nonce: u64 = rand::random();
        merges_dir.join(format!("{family_name}-{nonce:016x}"))
    }
}

/// A [`StoreFileLinker`] that writes a plain text pointer file, for tests
/// and for environments without the real store-file machinery.
pub struct PointerFileLinker;

impl StoreFileLinker for PointerFileLinker {
    fn link(
        &self,
        family_name: &str,
        source_store_file: &Path,
        merges_dir: &Path,
    ) -> Result<PathBuf, FilesystemError> {
        let target = FilesystemAdapter::scratch_subpath(merges_dir, family_name);
        fs::write(&target, source_store_file.to_string_lossy().as_bytes())?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{RegionId, TableName};
    use crate::model::region::{RegionDescriptor, RowKey};

    fn merged() -> MergedRegionDescriptor {
        let a = RegionDescriptor {
            table: TableName::new("t").unwrap(),
            start_key: RowKey::new(b"".to_vec()),
            end_key: RowKey::new(b"m".to_vec()),
            region_id: RegionId::new(1),
            mergeable: true,
            families: Vec::new(),
        };
        let b = RegionDescriptor {
            table: TableName::new("t").unwrap(),
            start_key: RowKey::new(b"m".to_vec()),
            end_key: RowKey::new(b"".to_vec()),
            region_id: RegionId::new(2),
            mergeable: true,
            families: Vec::new(),
        };
        MergedRegionDescriptor::derive(&a, &b, RegionId::new(3)).0
    }

    #[test]
    fn create_and_cleanup_merges_dir_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let fsa = FilesystemAdapter::new(root.path().to_owned());
        let dir = fsa.create_merges_dir("region-a").unwrap();
        assert!(dir.exists());
        fsa.cleanup_merges_dir("region-a").unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn create_merges_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let fsa = FilesystemAdapter::new(root.path().to_owned());
        fsa.create_merges_dir("region-a").unwrap();
        fsa.create_merges_dir("region-a").unwrap();
    }

    #[test]
    fn cleanup_missing_dir_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let fsa = FilesystemAdapter::new(root.path().to_owned());
        fsa.cleanup_merges_dir("never-created").unwrap();
    }

    #[test]
    fn cleanup_merged_region_dir_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let fsa = FilesystemAdapter::new(root.path().to_owned());
        let m = merged();
        let dir = fsa.region_dir(m.encoded_name().as_str());
        fs::create_dir_all(&dir).unwrap();
        fsa.cleanup_merged_region_dir(&m).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn scratch_subpaths_for_same_family_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = FilesystemAdapter::scratch_subpath(root.path(), "cf");
        let b = FilesystemAdapter::scratch_subpath(root.path(), "cf");
        assert_ne!(a, b);
    }

    #[test]
    fn pointer_file_linker_writes_pointer() {
        let root = tempfile::tempdir().unwrap();
        let linker = PointerFileLinker;
        let source = root.path().join("source-store-file");
        fs::write(&source, b"irrelevant").unwrap();
        let target = linker.link("cf", &source, root.path()).unwrap();
        let contents = fs::read_to_string(&target).unwrap();
        assert_eq!(contents, source.to_string_lossy());
    }
}
