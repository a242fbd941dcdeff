//! Region descriptors and the merged-region derivation formula.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::{EncodedName, RegionId, TableName};

/// A column family's on-disk store files, as seen by the region this
/// descriptor belongs to. Used only to drive reference-file materialization
/// (`StoreFileLinker::link`) during the merge; never consulted for anything
/// else in this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFamily {
    pub name: String,
    pub store_files: Vec<PathBuf>,
}

/// A row key, or one of the two sentinel boundary values representing −∞
/// (the start of the first region in a table) or +∞ (the end of the last
/// region in a table).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    /// The empty row key. As a start key this means −∞; as an end key it
    /// means +∞. Callers distinguish the two by position, matching the
    /// convention the catalog table itself uses.
    pub const EMPTY: Self = Self(Vec::new());

    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        }
    }
}

/// A data-node-local region descriptor: the subset of a region's catalog
/// entry the merge transaction needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub table: TableName,
    pub start_key: RowKey,
    pub end_key: RowKey,
    pub region_id: RegionId,
    /// Whether the region server considers this region mergeable right now
    /// (not already splitting, not already merging, not read-only, etc).
    /// Always real local state, never derived.
    pub mergeable: bool,
    /// This region's column families and their store files, consulted only
    /// when materializing merged store files (stage 6 of the executor).
    pub families: Vec<StoreFamily>,
}

impl RegionDescriptor {
    #[must_use]
    pub fn encoded_name(&self) -> EncodedName {
        EncodedName::derive(&self.table, self.start_key.as_bytes(), self.region_id)
    }

    /// The binary region name used as the catalog row key, distinct from
    /// [`Self::encoded_name`]: delimited `table || start key || id`, rather
    /// than a hash of the same inputs.
    #[must_use]
    pub fn region_name(&self) -> Vec<u8> {
        region_name(&self.table, &self.start_key, self.region_id)
    }

    /// Two regions are adjacent iff they belong to the same table and one's
    /// end key equals the other's start key.
    #[must_use]
    pub fn adjacent_to(&self, other: &Self) -> bool {
        self.table == other.table
            && (self.end_key == other.start_key || other.end_key == self.start_key)
    }
}

impl PartialOrd for RegionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegionDescriptor {
    /// Lexicographic on `(table, start key, region id)`.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.table, &self.start_key, self.region_id).cmp(&(
            &other.table,
            &other.start_key,
            other.region_id,
        ))
    }
}

/// A live region handle's static descriptor, unchanged for the lifetime of
/// the transaction (the descriptor is frozen at construction time; mutable
/// runtime state like `mergeable` is re-read from the region registry).
pub type Region = RegionDescriptor;

/// The descriptor for the region produced by merging two adjacent regions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRegionDescriptor {
    pub table: TableName,
    pub start_key: RowKey,
    pub end_key: RowKey,
    pub region_id: RegionId,
}

impl MergedRegionDescriptor {
    /// Derive the merged descriptor for two (already-ordered) adjacent
    /// regions `a` and `b`, with `a < b`.
    ///
    /// - `table` = `a.table`.
    /// - `start` = min(a.start, b.start), treating empty as −∞.
    /// - `end` = max(a.end, b.end), treating empty as +∞.
    /// - `id` = max(now, a.id + 1, b.id + 1), with a `clock_behind` flag set
    ///   when the wall clock was behind either parent's id.
    #[must_use]
    pub fn derive(a: &RegionDescriptor, b: &RegionDescriptor, now: RegionId) -> (Self, bool) {
        let start_key = min_start(&a.start_key, &b.start_key);
        let end_key = max_end(&a.end_key, &b.end_key);

        let a_next = RegionId::new(a.region_id.as_u64().saturating_add(1));
        let b_next = RegionId::new(b.region_id.as_u64().saturating_add(1));
        let floor = a_next.max(b_next);
        let clock_behind = now < floor;
        let region_id = now.max(floor);

        (
            Self {
                table: a.table.clone(),
                start_key,
                end_key,
                region_id,
            },
            clock_behind,
        )
    }

    #[must_use]
    pub fn encoded_name(&self) -> EncodedName {
        EncodedName::derive(&self.table, self.start_key.as_bytes(), self.region_id)
    }

    /// The binary catalog row key for the merged region. See
    /// [`RegionDescriptor::region_name`].
    #[must_use]
    pub fn region_name(&self) -> Vec<u8> {
        region_name(&self.table, &self.start_key, self.region_id)
    }
}

/// Delimited binary region name: `table || 0x00 || start key || 0x00 || id`.
/// Distinct from the encoded name, which hashes the same three inputs.
fn region_name(table: &TableName, start_key: &RowKey, region_id: RegionId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(table.as_str().len() + start_key.as_bytes().len() + 9);
    buf.extend_from_slice(table.as_str().as_bytes());
    buf.push(0);
    buf.extend_from_slice(start_key.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&region_id.as_u64().to_be_bytes());
    buf
}

/// `start_key == EMPTY` means −∞, so the empty key always wins a "min"
/// comparison unless both are empty.
fn min_start(a: &RowKey, b: &RowKey) -> RowKey {
    match (a.is_empty(), b.is_empty()) {
        (true, _) | (_, true) => RowKey::EMPTY,
        (false, false) => a.clone().min(b.clone()),
    }
}

/// `end_key == EMPTY` means +∞, so the empty key always wins a "max"
/// comparison unless both are empty.
fn max_end(a: &RowKey, b: &RowKey) -> RowKey {
    match (a.is_empty(), b.is_empty()) {
        (true, _) | (_, true) => RowKey::EMPTY,
        (false, false) => a.clone().max(b.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn adjacency_true_when_keys_touch() {
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"m", b"", 2, true);
        assert!(a.adjacent_to(&b));
        assert!(b.adjacent_to(&a));
    }

    #[test]
    fn adjacency_false_across_tables() {
        let a = region("t1", b"", b"m", 1, true);
        let b = region("t2", b"m", b"", 2, true);
        assert!(!a.adjacent_to(&b));
    }

    #[test]
    fn adjacency_false_when_gap_exists() {
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"n", b"", 2, true);
        assert!(!a.adjacent_to(&b));
    }

    #[test]
    fn merge_spans_full_range_with_open_ends() {
        let a = region("t", b"", b"m", 1, true);
        let b = region("t", b"m", b"", 2, true);
        let (merged, clock_behind) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(3));
        assert_eq!(merged.start_key, RowKey::EMPTY);
        assert_eq!(merged.end_key, RowKey::EMPTY);
        assert!(clock_behind);
        assert_eq!(merged.region_id, RegionId::new(3));
    }

    #[test]
    fn merge_id_is_max_of_clock_and_parents_plus_one() {
        let a = region("t", b"a", b"m", 10, true);
        let b = region("t", b"m", b"z", 20, true);
        let (merged, clock_behind) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(5));
        assert_eq!(merged.region_id, RegionId::new(21));
        assert!(clock_behind);
    }

    #[test]
    fn merge_id_uses_clock_when_ahead_of_parents() {
        let a = region("t", b"a", b"m", 10, true);
        let b = region("t", b"m", b"z", 20, true);
        let (merged, clock_behind) = MergedRegionDescriptor::derive(&a, &b, RegionId::new(1000));
        assert_eq!(merged.region_id, RegionId::new(1000));
        assert!(!clock_behind);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = region("t", b"a", b"m", 1, true);
        let b = region("t", b"m", b"z", 2, true);
        assert!(a < b);
    }

    #[test]
    fn region_name_differs_from_encoded_name() {
        let a = region("t", b"a", b"m", 1, true);
        assert_ne!(a.region_name(), a.encoded_name().as_str().as_bytes());
    }

    #[test]
    fn region_name_is_deterministic() {
        let a = region("t", b"a", b"m", 1, true);
        let b = region("t", b"a", b"m", 1, true);
        assert_eq!(a.region_name(), b.region_name());
    }
}
