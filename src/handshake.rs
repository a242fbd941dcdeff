//! Controller Handshake: tickles the merge znode until the external
//! controller deletes it (acknowledging the merge), or until the host
//! stops or starts stopping.
//!
//! Runs synchronously on the calling thread, sleeping between tickles
//! rather than using an async runtime or a timer — this crate stays
//! synchronous throughout, matching the rest of the executor.

use std::time::Duration;

use crate::coordination::CoordinationClient;
use crate::error::TransactionError;
use crate::lifecycle::{HostLifecycle, RegionRegistry};
use crate::model::region::MergedRegionDescriptor;

const TICKLE_INTERVAL: Duration = Duration::from_millis(100);

/// Tickle the merge znode until `tickle_merge` reports lost ownership
/// (`-1`) — the external controller has deleted the znode, meaning it has
/// acknowledged the merge and the handoff is complete — or until the host
/// stops or starts stopping.
///
/// There is no wall-clock timeout on the merge itself; only the znode's
/// disappearance or a host-liveness change ends the loop, matching the
/// concurrency model: the merge is allowed to take as long as it takes.
///
/// In `no_cluster` mode this returns immediately: there is no coordination
/// service to tickle.
///
/// # Errors
/// Returns [`TransactionError::Io`] if a tickle fails outright, or if the
/// host stops or starts stopping mid-handshake.
pub fn run_handshake(
    coordination: &dyn CoordinationClient,
    host: &dyn HostLifecycle,
    registry: &dyn RegionRegistry,
    merged: &MergedRegionDescriptor,
    mut version: i32,
    open_log_interval_ms: u64,
    no_cluster: bool,
) -> Result<(), TransactionError> {
    if no_cluster {
        return Ok(());
    }

    let merged_name = merged.encoded_name();
    let mut open_log_elapsed = Duration::ZERO;
    let open_log_interval = Duration::from_millis(open_log_interval_ms);

    loop {
        if host.is_stopped() {
            return Err(TransactionError::Io(
                "controller handshake interrupted: host stopped".to_owned(),
            ));
        }
        if registry.is_stopping() {
            return Err(TransactionError::Io(
                "controller handshake interrupted: host stopping".to_owned(),
            ));
        }

        version = coordination
            .tickle_merge(&merged_name, version, Vec::new())
            .map_err(|e| TransactionError::Io(e.to_string()))?;

        if version < 0 {
            // The controller deleted the znode: it has acknowledged the
            // merge and there is nothing left to hand off.
            return Ok(());
        }

        if open_log_elapsed >= open_log_interval {
            tracing::info!(region = %merged_name, "still waiting for the controller to acknowledge the merge");
            open_log_elapsed = Duration::ZERO;
        }
        open_log_elapsed += TICKLE_INTERVAL;

        std::thread::sleep(TICKLE_INTERVAL);
    }
}
