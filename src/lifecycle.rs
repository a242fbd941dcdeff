//! Region Lifecycle Adapter: the trait boundary to the region-server host
//! and its region lifecycle primitives (close, initialize, open).
//!
//! These primitives (`close`, `initialize`, `openHRegion`) are explicitly
//! out of scope for this crate — only the capability-set shape the
//! executor needs to drive them is defined here, following the same
//! dynamic-dispatch-by-narrow-trait pattern as [`crate::coordination`] and
//! [`crate::catalog`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::model::ids::EncodedName;
use crate::model::region::MergedRegionDescriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleError(pub String);

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lifecycle error: {}", self.0)
    }
}

impl std::error::Error for LifecycleError {}

/// The outcome of attempting to close a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call closed the region.
    Closed,
    /// The region was already closed by another thread before this call
    /// reached it. Not a failure: the executor treats this the same as a
    /// successful close except that it must not journal the close itself
    /// (see design notes).
    AlreadyClosed,
}

/// A single live region's lifecycle operations, scoped to the one region
/// a [`RegionHandle`] was obtained for.
pub trait RegionHandle {
    fn close(&self) -> Result<CloseOutcome, LifecycleError>;
    fn offline(&self) -> Result<(), LifecycleError>;
    /// Re-initialize the region after a rolled-back close/offline. Called
    /// only by rollback, to undo a `ClosedRegion*`/`OfflinedRegion*` journal
    /// entry; an I/O failure here is escalated to a fatal rollback failure
    /// since the region is left neither open nor cleanly closed.
    fn initialize(&self) -> Result<(), LifecycleError>;
}

/// The host-wide operations the executor needs beyond per-region ones:
/// creating and onlining the merged region.
pub trait HostLifecycle {
    fn initialize_merged_region(
        &self,
        merged: &MergedRegionDescriptor,
    ) -> Result<(), LifecycleError>;

    fn open_merged_region(&self, merged: &MergedRegionDescriptor) -> Result<(), LifecycleError>;

    /// Whether the host itself has fully stopped. Checked at the start of
    /// the transaction and throughout the controller handshake; a stopped
    /// host aborts the merge outright.
    fn is_stopped(&self) -> bool;
}

/// Looks up [`RegionHandle`]s by encoded region name, and tracks which
/// regions the host currently considers online.
pub trait RegionRegistry {
    fn handle(&self, encoded_name: &EncodedName) -> Option<Box<dyn RegionHandle>>;

    /// Whether the host is in the process of stopping (but not yet
    /// stopped). Like `HostLifecycle::is_stopped`, but for the slower
    /// graceful-shutdown path; checked at the same points.
    fn is_stopping(&self) -> bool;

    /// Remove a region from the online-region registry. Called during
    /// forward execution once a region is closed and offlined, and
    /// skipped entirely in `no_cluster` mode.
    fn remove_from_online(&self, encoded_name: &EncodedName) -> Result<(), LifecycleError>;

    /// Add a region back to the online-region registry. Called both to
    /// undo a rolled-back close/offline (A, B) and to register the merged
    /// region once it opens.
    fn add_online(&self, encoded_name: &EncodedName) -> Result<(), LifecycleError>;
}

/// An in-memory fake covering both [`HostLifecycle`] and [`RegionRegistry`],
/// plus per-region fakes implementing [`RegionHandle`], for tests.
pub struct FakeHost {
    offlined: Arc<Mutex<BTreeMap<String, bool>>>,
    initialized: Mutex<Vec<MergedRegionDescriptor>>,
    opened: Mutex<Vec<MergedRegionDescriptor>>,
    /// Regions pre-closed by "another thread" before the executor gets to
    /// them — used to exercise the concurrent-close scenario.
    pub pre_closed: Mutex<BTreeMap<String, bool>>,
    online: Mutex<BTreeMap<String, bool>>,
    stopped: Mutex<bool>,
    stopping: Mutex<bool>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            offlined: Arc::new(Mutex::new(BTreeMap::new())),
            initialized: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            pre_closed: Mutex::new(BTreeMap::new()),
            online: Mutex::new(BTreeMap::new()),
            stopped: Mutex::new(false),
            stopping: Mutex::new(false),
        }
    }

    /// Mark a region as already closed by a concurrent actor before the
    /// executor attempts to close it.
    pub fn pre_close(&self, encoded_name: &EncodedName) {
        #[allow(clippy::unwrap_used)]
        self.pre_closed
            .lock()
            .unwrap()
            .insert(encoded_name.as_str().to_owned(), true);
    }

    /// Mark a region as already online, as the executor's caller would
    /// have done before constructing a transaction for it.
    pub fn seed_online(&self, encoded_name: &EncodedName) {
        #[allow(clippy::unwrap_used)]
        self.online
            .lock()
            .unwrap()
            .insert(encoded_name.as_str().to_owned(), true);
    }

    pub fn set_stopped(&self, stopped: bool) {
        #[allow(clippy::unwrap_used)]
        {
            *self.stopped.lock().unwrap() = stopped;
        }
    }

    pub fn set_stopping(&self, stopping: bool) {
        #[allow(clippy::unwrap_used)]
        {
            *self.stopping.lock().unwrap() = stopping;
        }
    }

    #[must_use]
    pub fn was_offlined(&self, encoded_name: &EncodedName) -> bool {
        #[allow(clippy::unwrap_used)]
        self.offlined
            .lock()
            .unwrap()
            .get(encoded_name.as_str())
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn is_online(&self, encoded_name: &EncodedName) -> bool {
        #[allow(clippy::unwrap_used)]
        self.online
            .lock()
            .unwrap()
            .get(encoded_name.as_str())
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn initialized_regions(&self) -> Vec<MergedRegionDescriptor> {
        #[allow(clippy::unwrap_used)]
        self.initialized.lock().unwrap().clone()
    }

    #[must_use]
    pub fn opened_regions(&self) -> Vec<MergedRegionDescriptor> {
        #[allow(clippy::unwrap_used)]
        self.opened.lock().unwrap().clone()
    }
}

impl HostLifecycle for FakeHost {
    fn initialize_merged_region(
        &self,
        merged: &MergedRegionDescriptor,
    ) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.initialized.lock().unwrap().push(merged.clone());
        Ok(())
    }

    fn open_merged_region(&self, merged: &MergedRegionDescriptor) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.opened.lock().unwrap().push(merged.clone());
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        *self.stopped.lock().unwrap()
    }
}

impl RegionRegistry for FakeHost {
    fn handle(&self, encoded_name: &EncodedName) -> Option<Box<dyn RegionHandle>> {
        #[allow(clippy::unwrap_used)]
        let already_closed = self
            .pre_closed
            .lock()
            .unwrap()
            .get(encoded_name.as_str())
            .copied()
            .unwrap_or(false);
        Some(Box::new(FakeRegionHandle {
            name: encoded_name.as_str().to_owned(),
            already_closed,
            offlined: Arc::clone(&self.offlined),
        }))
    }

    fn is_stopping(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        *self.stopping.lock().unwrap()
    }

    fn remove_from_online(&self, encoded_name: &EncodedName) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.online
            .lock()
            .unwrap()
            .insert(encoded_name.as_str().to_owned(), false);
        Ok(())
    }

    fn add_online(&self, encoded_name: &EncodedName) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.online
            .lock()
            .unwrap()
            .insert(encoded_name.as_str().to_owned(), true);
        Ok(())
    }
}

struct FakeRegionHandle {
    name: String,
    already_closed: bool,
    offlined: Arc<Mutex<BTreeMap<String, bool>>>,
}

impl RegionHandle for FakeRegionHandle {
    fn close(&self) -> Result<CloseOutcome, LifecycleError> {
        if self.already_closed {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        Ok(CloseOutcome::Closed)
    }

    fn offline(&self) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.offlined.lock().unwrap().insert(self.name.clone(), true);
        Ok(())
    }

    fn initialize(&self) -> Result<(), LifecycleError> {
        #[allow(clippy::unwrap_used)]
        self.offlined.lock().unwrap().insert(self.name.clone(), false);
        Ok(())
    }
}
