//! Preparer: validates a region pair and computes the merged descriptor,
//! without touching the coordination service or the filesystem.
//!
//! Grounded on the same validate-then-freeze shape as an epoch-advancement
//! prepare phase: read just enough external state to decide go/no-go,
//! then hand back a pure, already-computed result with no further I/O
//! required to act on it.

use crate::catalog::CatalogClient;
use crate::error::ValidationReason;
use crate::model::ids::RegionId;
use crate::model::region::{MergedRegionDescriptor, RegionDescriptor};

/// The result of running the five prepare-time validation clauses.
#[derive(Debug)]
pub enum PrepareOutcome {
    Accepted {
        merged: MergedRegionDescriptor,
        clock_behind: bool,
    },
    Rejected(ValidationReason),
}

/// Run the prepare phase against a region pair.
///
/// Validation order matches the clauses in order:
/// 1. same table
/// 2. not the same region
/// 3. adjacent, unless `forcible`
/// 4. both mergeable
/// 5. neither already has a merge qualifier recorded in the catalog
///
/// A catalog read failure is treated as a rejection (with a warning
/// logged), never propagated as an error — the transaction simply does
/// not proceed.
pub fn prepare(
    a: &RegionDescriptor,
    b: &RegionDescriptor,
    forcible: bool,
    catalog: &dyn CatalogClient,
    now: RegionId,
) -> PrepareOutcome {
    if a.table != b.table {
        return PrepareOutcome::Rejected(ValidationReason::DifferentTables);
    }

    if a == b {
        return PrepareOutcome::Rejected(ValidationReason::SameRegion);
    }

    if !forcible && !a.adjacent_to(b) {
        return PrepareOutcome::Rejected(ValidationReason::NotAdjacent);
    }

    // Normalize so `a < b` for everything downstream (merged-descriptor
    // derivation, journal bookkeeping, rollback ordering).
    let (a, b) = if a <= b { (a, b) } else { (b, a) };

    if !a.mergeable {
        return PrepareOutcome::Rejected(ValidationReason::NotMergeable {
            region: Box::new(a.encoded_name()),
        });
    }
    if !b.mergeable {
        return PrepareOutcome::Rejected(ValidationReason::NotMergeable {
            region: Box::new(b.encoded_name()),
        });
    }

    for region in [a, b] {
        match catalog.has_merge_qualifier(&region.encoded_name()) {
            Ok(true) => {
                return PrepareOutcome::Rejected(ValidationReason::AlreadyMerging {
                    region: Box::new(region.encoded_name()),
                });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, region = %region.encoded_name(), "catalog read failed during prepare");
                return PrepareOutcome::Rejected(ValidationReason::CatalogUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    let (merged, clock_behind) = MergedRegionDescriptor::derive(a, b, now);
    PrepareOutcome::Accepted {
        merged,
        clock_behind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FakeCatalogClient;
    use crate::model::ids::TableName;
    use crate::model::region::RowKey;

    fn region(table: &str, start: &[u8], end: &[u8], id: u64, mergeable: bool) -> RegionDescriptor {
        RegionDescriptor {
            table: TableName::new(table).unwrap(),
            start_key: RowKey::new(start.to_vec()),
            end_key: RowKey::new(end.to_vec()),
            region_id: RegionId::new(id),
            mergeable,
            families: Vec::new(),
        }
    }

    #[test]
    fn rejects_different_tables() {
        let catalog = FakeCatalogClient::new();
        let a = region("t1", b"", b"m", 1, true);
        let b = region("t2", b"m", b"", 2, true);
        let outcome = prepare(&a, &b, false, &catalog, RegionId::new(100));
        assert!(matches!(
            outcome,
            PrepareOutcome::Rejected(ValidationReason::DifferentTables)
        ));
    }

    #[test]
    fn rejects_same_region() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, true);
        let outcome = prepare(&a, &a.clone(), false, &catalog, RegionId::new(100));
        assert!(matches!(
            outcome,
            PrepareOutcome::Rejected(ValidationReason::SameRegion)
        ));
    }

    #[test]
    fn rejects_non_adjacent_unless_forcible() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"n", b"", 2, true);
        let outcome = prepare(&a, &b, false, &catalog, RegionId::new(100));
        assert!(matches!(
            outcome,
            PrepareOutcome::Rejected(ValidationReason::NotAdjacent)
        ));

        let forced = prepare(&a, &b, true, &catalog, RegionId::new(100));
        assert!(matches!(forced, PrepareOutcome::Accepted { .. }));
    }

    #[test]
    fn rejects_unmergeable_region() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, false);
        let b = region("t", b"m", b"", 2, true);
        let outcome = prepare(&a, &b, false, &catalog, RegionId::new(100));
        assert!(matches!(
            outcome,
            PrepareOutcome::Rejected(ValidationReason::NotMergeable { .. })
        ));
    }

    #[test]
    fn rejects_region_with_existing_merge_qualifier() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"m", b"", 2, true);
        catalog.mark_merge_qualifier(&a.encoded_name());
        let outcome = prepare(&a, &b, false, &catalog, RegionId::new(100));
        assert!(matches!(
            outcome,
            PrepareOutcome::Rejected(ValidationReason::AlreadyMerging { .. })
        ));
    }

    #[test]
    fn accepts_valid_adjacent_pair() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"m", b"", 2, true);
        let outcome = prepare(&a, &b, false, &catalog, RegionId::new(100));
        match outcome {
            PrepareOutcome::Accepted { merged, .. } => {
                assert_eq!(merged.table, TableName::new("t").unwrap());
            }
            PrepareOutcome::Rejected(reason) => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn accepts_pair_regardless_of_argument_order() {
        let catalog = FakeCatalogClient::new();
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"m", b"", 2, true);
        let forward = prepare(&a, &b, false, &catalog, RegionId::new(100));
        let backward = prepare(&b, &a, false, &catalog, RegionId::new(100));
        match (forward, backward) {
            (PrepareOutcome::Accepted { merged: m1, .. }, PrepareOutcome::Accepted { merged: m2, .. }) => {
                assert_eq!(m1, m2);
            }
            _ => panic!("expected both orderings to be accepted identically"),
        }
    }
}
