//! The merge transaction's journal: an append-only, ordered record of
//! completed stages, persisted atomically so a crash never loses or
//! corrupts it.
//!
//! Once [`JournalStage::Ponr`] has been appended the transaction is past
//! its point of no return: [`Journal::can_rollback`] returns `false` and
//! the executor must stop attempting rollback and hand the rest of the
//! work to crash recovery / roll-forward instead.

use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::ids::EncodedName;
use crate::model::region::{MergedRegionDescriptor, RegionDescriptor};

/// One completed step of the region-merge transaction, in the order the
/// executor performs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStage {
    SetMergingInZk,
    CreatedMergeDir,
    ClosedRegionA,
    OfflinedRegionA,
    ClosedRegionB,
    OfflinedRegionB,
    StartedMergedRegionCreation,
    /// Point of no return. Once this is journaled, rollback is refused.
    Ponr,
}

impl JournalStage {
    /// The full forward sequence, in order. Used to validate that entries
    /// are appended in the right order and to drive reverse-order rollback.
    pub const SEQUENCE: [Self; 8] = [
        Self::SetMergingInZk,
        Self::CreatedMergeDir,
        Self::ClosedRegionA,
        Self::OfflinedRegionA,
        Self::ClosedRegionB,
        Self::OfflinedRegionB,
        Self::StartedMergedRegionCreation,
        Self::Ponr,
    ];
}

impl fmt::Display for JournalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SetMergingInZk => "SET_MERGING_IN_ZK",
            Self::CreatedMergeDir => "CREATED_MERGE_DIR",
            Self::ClosedRegionA => "CLOSED_REGION_A",
            Self::OfflinedRegionA => "OFFLINED_REGION_A",
            Self::ClosedRegionB => "CLOSED_REGION_B",
            Self::OfflinedRegionB => "OFFLINED_REGION_B",
            Self::StartedMergedRegionCreation => "STARTED_MERGED_REGION_CREATION",
            Self::Ponr => "PONR",
        };
        f.write_str(s)
    }
}

/// In-memory journal for a single in-flight transaction. Append-only;
/// nothing is ever removed from `entries` during normal operation.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Vec<JournalStage>,
}

impl Journal {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn append(&mut self, stage: JournalStage) {
        self.entries.push(stage);
    }

    #[must_use]
    pub fn entries(&self) -> &[JournalStage] {
        &self.entries
    }

    #[must_use]
    pub fn contains(&self, stage: JournalStage) -> bool {
        self.entries.contains(&stage)
    }

    /// `false` once [`JournalStage::Ponr`] has been journaled.
    #[must_use]
    pub fn can_rollback(&self) -> bool {
        !self.contains(JournalStage::Ponr)
    }

    /// Entries in reverse order of completion, the order rollback must
    /// undo them in.
    pub fn rollback_order(&self) -> impl Iterator<Item = &JournalStage> {
        self.entries.iter().rev()
    }
}

// ---------------------------------------------------------------------------
// Persisted journal file (crash-recovery aid)
// ---------------------------------------------------------------------------

/// The journal plus enough transaction context to let a restarted process
/// recognize an in-flight merge and decide whether to roll forward.
///
/// This is additive durability beyond the in-memory [`Journal`]: during a
/// live transaction the in-memory journal is authoritative, and this file
/// is written after each append purely so a crashed process has something
/// to read on restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalFile {
    pub merged: MergedRegionDescriptor,
    pub region_a: RegionDescriptor,
    pub region_b: RegionDescriptor,
    pub znode_version: i32,
    pub entries: Vec<JournalStage>,
}

impl JournalFile {
    #[must_use]
    pub const fn new(
        merged: MergedRegionDescriptor,
        region_a: RegionDescriptor,
        region_b: RegionDescriptor,
    ) -> Self {
        Self {
            merged,
            region_a,
            region_b,
            znode_version: 0,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn can_rollback(&self) -> bool {
        !self.entries.contains(&JournalStage::Ponr)
    }

    /// Serialize, write to a temp file in the same directory, fsync, then
    /// atomically rename over the target path.
    ///
    /// # Errors
    /// Returns [`JournalError`] on serialization or I/O failure.
    pub fn write_atomic(&self, path: &Path) -> Result<(), JournalError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| JournalError::Serialize(e.to_string()))?;

        let dir = path
            .parent()
            .ok_or_else(|| JournalError::Io(format!("no parent directory for {}", path.display())))?;
        let tmp_path = dir.join(format!(
            ".journal-{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp")
        ));

        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| JournalError::Io(format!("create {}: {e}", tmp_path.display())))?;
        file.write_all(json.as_bytes())
            .map_err(|e| JournalError::Io(format!("write {}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| JournalError::Io(format!("fsync {}: {e}", tmp_path.display())))?;
        drop(file);

        fs::rename(&tmp_path, path).map_err(|e| {
            JournalError::Io(format!(
                "rename {} -> {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })
    }

    /// Read a journal file from disk.
    ///
    /// # Errors
    /// Returns [`JournalError::NotFound`] if no file exists at `path`.
    pub fn read(path: &Path) -> Result<Self, JournalError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JournalError::NotFound(path.to_owned())
            } else {
                JournalError::Io(format!("read {}: {e}", path.display()))
            }
        })?;
        serde_json::from_str(&contents).map_err(|e| JournalError::Deserialize(e.to_string()))
    }

    /// Default journal file path for a given host state directory.
    #[must_use]
    pub fn default_path(state_dir: &Path, encoded_name: &EncodedName) -> PathBuf {
        state_dir.join(format!("merge-transaction-{}.json", encoded_name.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalError {
    NotFound(PathBuf),
    Serialize(String),
    Deserialize(String),
    Io(String),
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "journal file not found: {}", path.display()),
            Self::Serialize(msg) => write!(f, "journal serialize error: {msg}"),
            Self::Deserialize(msg) => write!(f, "journal deserialize error: {msg}"),
            Self::Io(msg) => write!(f, "journal I/O error: {msg}"),
        }
    }
}

impl std::error::Error for JournalError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{RegionId, TableName};
    use crate::model::region::RowKey;

    fn descriptor(table: &str, start: &[u8], end: &[u8], id: u64) -> RegionDescriptor {
        RegionDescriptor {
            table: TableName::new(table).unwrap(),
            start_key: RowKey::new(start.to_vec()),
            end_key: RowKey::new(end.to_vec()),
            region_id: RegionId::new(id),
            mergeable: true,
            families: Vec::new(),
        }
    }

    #[test]
    fn can_rollback_until_ponr_appended() {
        let mut j = Journal::new();
        assert!(j.can_rollback());
        for stage in &JournalStage::SEQUENCE[..7] {
            j.append(*stage);
            assert!(j.can_rollback());
        }
        j.append(JournalStage::Ponr);
        assert!(!j.can_rollback());
    }

    #[test]
    fn rollback_order_is_reverse_of_append_order() {
        let mut j = Journal::new();
        j.append(JournalStage::SetMergingInZk);
        j.append(JournalStage::CreatedMergeDir);
        j.append(JournalStage::ClosedRegionA);
        let order: Vec<_> = j.rollback_order().copied().collect();
        assert_eq!(
            order,
            vec![
                JournalStage::ClosedRegionA,
                JournalStage::CreatedMergeDir,
                JournalStage::SetMergingInZk,
            ]
        );
    }

    #[test]
    fn journal_file_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let a = descriptor("t", b"", b"m", 1);
        let b = descriptor("t", b"m", b"", 2);
        let (merged, _) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        let encoded = merged.encoded_name();
        let path = JournalFile::default_path(dir.path(), &encoded);

        let mut file = JournalFile::new(merged, a, b);
        file.entries.push(JournalStage::SetMergingInZk);
        file.write_atomic(&path).unwrap();

        let loaded = JournalFile::read(&path).unwrap();
        assert_eq!(loaded, file);
        assert!(loaded.can_rollback());
    }

    #[test]
    fn journal_file_with_ponr_reports_cannot_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let a = descriptor("t", b"", b"m", 1);
        let b = descriptor("t", b"m", b"", 2);
        let (merged, _) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        let encoded = merged.encoded_name();
        let path = JournalFile::default_path(dir.path(), &encoded);

        let mut file = JournalFile::new(merged, a, b);
        file.entries.push(JournalStage::Ponr);
        file.write_atomic(&path).unwrap();

        let loaded = JournalFile::read(&path).unwrap();
        assert!(!loaded.can_rollback());
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let path = PathBuf::from("/tmp/nonexistent-region-merge-journal-test.json");
        let err = JournalFile::read(&path).unwrap_err();
        assert!(matches!(err, JournalError::NotFound(_)));
    }

    #[test]
    fn write_overwrite_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = descriptor("t", b"", b"m", 1);
        let b = descriptor("t", b"m", b"", 2);
        let (merged, _) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        let encoded = merged.encoded_name();
        let path = JournalFile::default_path(dir.path(), &encoded);

        let file = JournalFile::new(merged, a, b);
        file.write_atomic(&path).unwrap();
        file.write_atomic(&path).unwrap();

        let tmp_name = format!(
            ".journal-{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap()
        );
        assert!(!dir.path().join(tmp_name).exists());
    }
}
