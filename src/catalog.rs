//! Catalog Writer Adapter: the trait boundary to the catalog table that
//! tracks which region owns which key range.
//!
//! The real catalog table is out of scope for this crate; see the design
//! notes. `merge_regions` must be atomic: all three rows (delete A, delete
//! B, insert merged) are updated as one unit, or none are.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::model::ids::EncodedName;
use crate::model::region::{MergedRegionDescriptor, RegionDescriptor};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogError(pub String);

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "catalog error: {}", self.0)
    }
}

impl std::error::Error for CatalogError {}

/// Which data node originated a merge, recorded alongside the merged row
/// so the catalog can be audited after the fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOrigin {
    pub region_server: String,
}

/// The catalog operations the merge transaction needs.
///
/// # Invariants
/// - `merge_regions` is all-or-nothing: on success the merged row exists
///   and both parent rows are gone; on failure the catalog is unchanged.
/// - `has_merge_qualifier` reflects whether a prior (possibly abandoned)
///   merge attempt already recorded a qualifier against this region —
///   used by the preparer to refuse overlapping merge attempts.
pub trait CatalogClient {
    fn merge_regions(
        &self,
        merged: &MergedRegionDescriptor,
        a: &RegionDescriptor,
        b: &RegionDescriptor,
        origin: &MergeOrigin,
    ) -> Result<(), CatalogError>;

    fn has_merge_qualifier(&self, region: &EncodedName) -> Result<bool, CatalogError>;
}

/// An in-memory fake catalog for tests.
#[derive(Default)]
pub struct FakeCatalogClient {
    merge_qualifiers: Mutex<BTreeMap<String, bool>>,
    merged_rows: Mutex<Vec<MergedRegionDescriptor>>,
    /// When set, `merge_regions` fails with this message instead of
    /// succeeding — used to simulate a post-PONR catalog failure.
    pub fail_merge_with: Mutex<Option<String>>,
}

impl FakeCatalogClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            merge_qualifiers: Mutex::new(BTreeMap::new()),
            merged_rows: Mutex::new(Vec::new()),
            fail_merge_with: Mutex::new(None),
        }
    }

    pub fn mark_merge_qualifier(&self, region: &EncodedName) {
        #[allow(clippy::unwrap_used)]
        self.merge_qualifiers
            .lock()
            .unwrap()
            .insert(region.as_str().to_owned(), true);
    }

    #[must_use]
    pub fn merged_rows(&self) -> Vec<MergedRegionDescriptor> {
        #[allow(clippy::unwrap_used)]
        self.merged_rows.lock().unwrap().clone()
    }
}

impl CatalogClient for FakeCatalogClient {
    fn merge_regions(
        &self,
        merged: &MergedRegionDescriptor,
        _a: &RegionDescriptor,
        _b: &RegionDescriptor,
        _origin: &MergeOrigin,
    ) -> Result<(), CatalogError> {
        #[allow(clippy::unwrap_used)]
        if let Some(msg) = self.fail_merge_with.lock().unwrap().clone() {
            return Err(CatalogError(msg));
        }
        #[allow(clippy::unwrap_used)]
        self.merged_rows.lock().unwrap().push(merged.clone());
        Ok(())
    }

    fn has_merge_qualifier(&self, region: &EncodedName) -> Result<bool, CatalogError> {
        #[allow(clippy::unwrap_used)]
        Ok(self
            .merge_qualifiers
            .lock()
            .unwrap()
            .get(region.as_str())
            .copied()
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{RegionId, TableName};
    use crate::model::region::RowKey;

    fn region(start: &[u8], end: &[u8], id: u64) -> RegionDescriptor {
        RegionDescriptor {
            table: TableName::new("t").unwrap(),
            start_key: RowKey::new(start.to_vec()),
            end_key: RowKey::new(end.to_vec()),
            region_id: RegionId::new(id),
            mergeable: true,
            families: Vec::new(),
        }
    }

    #[test]
    fn merge_regions_records_merged_row() {
        let catalog = FakeCatalogClient::new();
        let a = region(b"", b"m", 1);
        let b = region(b"m", b"", 2);
        let (merged, _) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        let origin = MergeOrigin {
            region_server: "rs1".to_owned(),
        };
        catalog.merge_regions(&merged, &a, &b, &origin).unwrap();
        assert_eq!(catalog.merged_rows(), vec![merged]);
    }

    #[test]
    fn merge_qualifier_defaults_to_false() {
        let catalog = FakeCatalogClient::new();
        let encoded = EncodedName::derive(&TableName::new("t").unwrap(), b"m", RegionId::new(1));
        assert_eq!(catalog.has_merge_qualifier(&encoded), Ok(false));
    }

    #[test]
    fn forced_failure_propagates() {
        let catalog = FakeCatalogClient::new();
        #[allow(clippy::unwrap_used)]
        {
            *catalog.fail_merge_with.lock().unwrap() = Some("disk full".to_owned());
        }
        let a = region(b"", b"m", 1);
        let b = region(b"m", b"", 2);
        let (merged, _) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        let origin = MergeOrigin {
            region_server: "rs1".to_owned(),
        };
        let err = catalog.merge_regions(&merged, &a, &b, &origin).unwrap_err();
        assert_eq!(err.0, "disk full");
    }
}
