//! Coordinator Adapter: the trait boundary to the external coordination
//! service (a ZooKeeper-style ephemeral znode tree).
//!
//! This module defines the contract; it does not ship a real client. A real
//! implementation lives outside this crate's scope (see [`crate` docs],
//! §1 of the design notes). Tests use [`FakeCoordinationClient`].
//!
//! Every transition here is a compare-and-swap keyed on the znode's
//! version: callers pass the version they last observed, and a mismatch
//! means someone else moved the znode first. This mirrors a git ref CAS
//! update — "move this pointer only if it's still where I last saw it".

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::ids::EncodedName;

/// A znode's version-stamped payload, as Observed by a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZnodeState {
    pub version: i32,
    pub payload: Vec<u8>,
}

/// Why a coordination operation failed outright. Losing a CAS race on
/// `transition_*`/`tickle_merge` is not one of these — those report it by
/// returning `-1`, not an `Err`. `delete_if_in_state` still reports a
/// version mismatch as an error: the rollback path that calls it needs to
/// distinguish "already gone" (fine) from "someone else is now holding the
/// znode in an unexpected state" (an escalation-worthy surprise).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinationError {
    /// The expected version did not match what the coordination service
    /// currently holds — someone else moved the znode first.
    VersionMismatch { path: String },
    /// The znode being created already exists.
    AlreadyExists { path: String },
    /// Any other transient failure (network, session expiry, etc).
    Io(String),
}

impl std::fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VersionMismatch { path } => write!(f, "version mismatch at {path}"),
            Self::AlreadyExists { path } => write!(f, "znode already exists: {path}"),
            Self::Io(msg) => write!(f, "coordination I/O error: {msg}"),
        }
    }
}

impl std::error::Error for CoordinationError {}

/// The region-merge-relevant subset of the coordination-service client.
///
/// # Invariants
/// - `create_ephemeral_merging` fails with [`CoordinationError::AlreadyExists`]
///   if a merge znode already exists for `encoded_name`.
/// - `transition_*`/`tickle_merge` are CAS, but losing the race is not an
///   error: if `expected_version` does not match the znode's current
///   version, **or the znode is gone entirely**, they return `Ok(-1)`. The
///   caller treats `-1` as "lost ownership of this merge" either way —
///   `tickle_merge` in particular relies on a missing znode (the external
///   controller deleted it once the merge was acknowledged) producing the
///   same sentinel as a version race, not a `NoNode` error.
/// - `delete_if_in_state` is a no-op (not an error) if the znode is already
///   gone.
pub trait CoordinationClient {
    /// Create the ephemeral merge znode in the `MERGING` state with an
    /// empty payload. Returns the initial version.
    fn create_ephemeral_merging(&self, encoded_name: &EncodedName) -> Result<i32, CoordinationError>;

    /// `MERGING -> MERGING` (used twice, deliberately — see design notes)
    /// or `MERGING -> MERGE`, depending on `payload`. Returns `-1` on a lost
    /// CAS race or a missing znode.
    fn transition_merging(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError>;

    /// `MERGING -> MERGE`, writing the merged + source descriptors as the
    /// payload. Returns `-1` on a lost CAS race or a missing znode.
    fn transition_merge_final(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError>;

    /// `MERGE -> MERGE` tickle: re-write the same state with a fresh
    /// payload so the external controller knows the region server is still
    /// alive and working on it. Returns `-1` if the znode is gone — the
    /// controller has acknowledged the merge and deleted it, which is the
    /// handshake's normal exit condition, not a failure.
    fn tickle_merge(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError>;

    /// Delete the merge znode if it is still in the expected version.
    /// A missing znode is treated as already deleted, not an error.
    fn delete_if_in_state(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
    ) -> Result<(), CoordinationError>;

    /// Read the current znode state, if any.
    fn read(&self, encoded_name: &EncodedName) -> Result<Option<ZnodeState>, CoordinationError>;
}

/// An in-memory fake for tests. Not thread-contended in any interesting
/// way; exists purely to exercise CAS semantics without a real cluster.
#[derive(Default)]
pub struct FakeCoordinationClient {
    znodes: Mutex<HashMap<String, ZnodeState>>,
}

impl FakeCoordinationClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            znodes: Mutex::new(HashMap::new()),
        }
    }
}

impl CoordinationClient for FakeCoordinationClient {
    fn create_ephemeral_merging(&self, encoded_name: &EncodedName) -> Result<i32, CoordinationError> {
        #[allow(clippy::unwrap_used)]
        let mut znodes = self.znodes.lock().unwrap();
        let path = encoded_name.as_str().to_owned();
        if znodes.contains_key(&path) {
            return Err(CoordinationError::AlreadyExists { path });
        }
        znodes.insert(
            path,
            ZnodeState {
                version: 0,
                payload: Vec::new(),
            },
        );
        Ok(0)
    }

    fn transition_merging(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError> {
        self.cas_write(encoded_name, expected_version, payload)
    }

    fn transition_merge_final(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError> {
        self.cas_write(encoded_name, expected_version, payload)
    }

    fn tickle_merge(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError> {
        self.cas_write(encoded_name, expected_version, payload)
    }

    fn delete_if_in_state(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
    ) -> Result<(), CoordinationError> {
        #[allow(clippy::unwrap_used)]
        let mut znodes = self.znodes.lock().unwrap();
        let path = encoded_name.as_str().to_owned();
        match znodes.get(&path) {
            None => Ok(()),
            Some(state) if state.version == expected_version => {
                znodes.remove(&path);
                Ok(())
            }
            Some(_) => Err(CoordinationError::VersionMismatch { path }),
        }
    }

    fn read(&self, encoded_name: &EncodedName) -> Result<Option<ZnodeState>, CoordinationError> {
        #[allow(clippy::unwrap_used)]
        let znodes = self.znodes.lock().unwrap();
        Ok(znodes.get(encoded_name.as_str()).cloned())
    }
}

impl FakeCoordinationClient {
    fn cas_write(
        &self,
        encoded_name: &EncodedName,
        expected_version: i32,
        payload: Vec<u8>,
    ) -> Result<i32, CoordinationError> {
        #[allow(clippy::unwrap_used)]
        let mut znodes = self.znodes.lock().unwrap();
        let path = encoded_name.as_str().to_owned();
        match znodes.get(&path) {
            None => Ok(-1),
            Some(state) if state.version == expected_version => {
                let next_version = state.version + 1;
                znodes.insert(
                    path,
                    ZnodeState {
                        version: next_version,
                        payload,
                    },
                );
                Ok(next_version)
            }
            Some(_) => Ok(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> EncodedName {
        use crate::model::ids::{RegionId, TableName};
        EncodedName::derive(&TableName::new("t").unwrap(), b"m", RegionId::new(1))
    }

    #[test]
    fn create_then_duplicate_create_fails() {
        let client = FakeCoordinationClient::new();
        let n = name();
        assert_eq!(client.create_ephemeral_merging(&n), Ok(0));
        assert!(matches!(
            client.create_ephemeral_merging(&n),
            Err(CoordinationError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn cas_transition_bumps_version() {
        let client = FakeCoordinationClient::new();
        let n = name();
        client.create_ephemeral_merging(&n).unwrap();
        let v1 = client
            .transition_merging(&n, 0, Vec::new())
            .expect("cas should succeed against matching version");
        assert_eq!(v1, 1);
    }

    #[test]
    fn cas_mismatch_returns_lost_ownership_sentinel() {
        let client = FakeCoordinationClient::new();
        let n = name();
        client.create_ephemeral_merging(&n).unwrap();
        let version = client.transition_merging(&n, 5, Vec::new()).unwrap();
        assert_eq!(version, -1);
    }

    #[test]
    fn tickle_after_controller_deletes_znode_returns_lost_ownership_sentinel() {
        let client = FakeCoordinationClient::new();
        let n = name();
        client.create_ephemeral_merging(&n).unwrap();
        client.delete_if_in_state(&n, 0).unwrap();
        let version = client.tickle_merge(&n, 0, Vec::new()).unwrap();
        assert_eq!(version, -1);
    }

    #[test]
    fn delete_if_in_state_is_idempotent_on_missing_znode() {
        let client = FakeCoordinationClient::new();
        let n = name();
        assert_eq!(client.delete_if_in_state(&n, 0), Ok(()));
    }

    #[test]
    fn delete_wrong_version_rejected() {
        let client = FakeCoordinationClient::new();
        let n = name();
        client.create_ephemeral_merging(&n).unwrap();
        let err = client.delete_if_in_state(&n, 7).unwrap_err();
        assert!(matches!(err, CoordinationError::VersionMismatch { .. }));
    }
}
