//! Executor: drives the staged region-merge sequence, enforces the point
//! of no return, and invokes rollback on failure before the PONR.
//!
//! Stage order (mirrors [`crate::journal::JournalStage::SEQUENCE`], plus
//! stages that deliberately do not get their own journal entry):
//!
//! 1. Liveness check: fail outright if the host is stopped or stopping.
//! 2. Create the ephemeral merge znode (`SET_MERGING_IN_ZK`).
//! 3. Transition it `MERGING -> MERGING` twice. This looks redundant but
//!    is intentional (see design notes) and must not be collapsed into a
//!    single call.
//! 4. Create the merges working directory (`CREATED_MERGE_DIR`).
//! 5. Close region A (`CLOSED_REGION_A`) — fails the transaction if A was
//!    already closed by another thread; that's a concurrent-close error,
//!    not something to paper over.
//! 6. Offline region A (`OFFLINED_REGION_A`) and remove it from the
//!    online-region registry (skipped in `no_cluster` mode).
//! 7. Close region B (`CLOSED_REGION_B`), same concurrent-close handling.
//! 8. Offline region B (`OFFLINED_REGION_B`), same registry removal.
//! 9. For every column family of A and B, link each store file into the
//!    merges directory. No journal entry: this step is pure derived state,
//!    trivially redone from A/B's own store files if a crash interrupts it.
//! 10. Journal `STARTED_MERGED_REGION_CREATION` *before* initializing the
//!     merged region's directory — deliberately out of effect order, so a
//!     crash between the journal write and the directory write still tells
//!     cleanup where to look.
//! 11. Transition the znode `MERGING -> MERGE` and journal `PONR`. Past
//!     this point rollback is refused.
//! 12. Atomically update the catalog (skipped in `no_cluster` mode), open
//!     the merged region, and register it online.
//! 13. Hand off to the controller handshake (tickle loop).

use crate::catalog::{CatalogClient, MergeOrigin};
use crate::coordination::CoordinationClient;
use crate::error::{RollbackFailure, TransactionError};
use crate::filesystem::{FilesystemAdapter, StoreFileLinker};
use crate::journal::{Journal, JournalStage};
use crate::lifecycle::{CloseOutcome, HostLifecycle, RegionRegistry};
use crate::model::ids::EncodedName;
use crate::model::region::{MergedRegionDescriptor, RegionDescriptor};

/// Everything the executor needs, bundled so call sites don't have to pass
/// separate trait object references around.
pub struct ExecutorDeps<'a> {
    pub coordination: &'a dyn CoordinationClient,
    pub catalog: &'a dyn CatalogClient,
    pub host: &'a (dyn HostLifecycle),
    pub registry: &'a dyn RegionRegistry,
    pub filesystem: &'a FilesystemAdapter,
    pub linker: &'a dyn StoreFileLinker,
    /// When true, disables all coordination-service and catalog side
    /// effects (used by tests run without a live cluster).
    pub no_cluster: bool,
}

/// Execute the merge transaction for an already-prepared pair.
///
/// On success, the journal records every stage through `PONR`; the caller
/// is expected to proceed to the controller handshake
/// ([`crate::handshake::run_handshake`]).
///
/// On failure before the PONR, this function calls [`rollback`] itself and
/// returns the original error (not a rollback error), so callers see why
/// the transaction failed rather than why rollback ran.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    deps: &ExecutorDeps<'_>,
    region_a: &RegionDescriptor,
    region_b: &RegionDescriptor,
    merged: &MergedRegionDescriptor,
    origin: &MergeOrigin,
) -> Result<Journal, TransactionError> {
    let mut journal = Journal::new();

    match run_forward(deps, region_a, region_b, merged, origin, &mut journal) {
        Ok(()) => Ok(journal),
        Err(e) => {
            if journal.can_rollback() {
                if let Err(rollback_err) =
                    rollback(deps, region_a, region_b, merged, &mut journal)
                {
                    tracing::error!(error = %rollback_err, "rollback failed after forward-stage error");
                }
            }
            Err(e)
        }
    }
}

fn run_forward(
    deps: &ExecutorDeps<'_>,
    region_a: &RegionDescriptor,
    region_b: &RegionDescriptor,
    merged: &MergedRegionDescriptor,
    origin: &MergeOrigin,
    journal: &mut Journal,
) -> Result<(), TransactionError> {
    let merged_name = merged.encoded_name();

    // Stage 1: liveness check.
    if deps.host.is_stopped() {
        return Err(TransactionError::Io("region server is stopped".to_owned()));
    }
    if deps.registry.is_stopping() {
        return Err(TransactionError::Io("region server is stopping".to_owned()));
    }

    // Stages 2-3: claim the merge in the coordination service.
    let version = claim_in_coordination(deps, &merged_name, journal)?;

    // Stage 4: merges directory.
    deps.filesystem
        .create_merges_dir(region_a.encoded_name().as_str())
        .map_err(|e| TransactionError::Io(e.to_string()))?;
    journal.append(JournalStage::CreatedMergeDir);

    // Stages 5-6: close + offline region A.
    close_region(deps, region_a, JournalStage::ClosedRegionA, journal)?;
    let handle_a = deps
        .registry
        .handle(&region_a.encoded_name())
        .ok_or_else(|| TransactionError::Io("region A handle not found".to_owned()))?;
    handle_a
        .offline()
        .map_err(|e| TransactionError::Io(e.to_string()))?;
    journal.append(JournalStage::OfflinedRegionA);
    if !deps.no_cluster {
        deps.registry
            .remove_from_online(&region_a.encoded_name())
            .map_err(|e| TransactionError::Io(e.to_string()))?;
    }

    // Stages 7-8: close + offline region B.
    close_region(deps, region_b, JournalStage::ClosedRegionB, journal)?;
    let handle_b = deps
        .registry
        .handle(&region_b.encoded_name())
        .ok_or_else(|| TransactionError::Io("region B handle not found".to_owned()))?;
    handle_b
        .offline()
        .map_err(|e| TransactionError::Io(e.to_string()))?;
    journal.append(JournalStage::OfflinedRegionB);
    if !deps.no_cluster {
        deps.registry
            .remove_from_online(&region_b.encoded_name())
            .map_err(|e| TransactionError::Io(e.to_string()))?;
    }

    // Stage 9: materialize merged store files. Pure derived state, so no
    // journal entry — see module docs. Both regions' store files land in
    // the single merges directory rooted at region A.
    let merges_dir = deps.filesystem.merges_dir(region_a.encoded_name().as_str());
    link_store_files(deps, region_a, &merges_dir)?;
    link_store_files(deps, region_b, &merges_dir)?;

    // Stage 10: journal before the effect, deliberately.
    journal.append(JournalStage::StartedMergedRegionCreation);
    deps.host
        .initialize_merged_region(merged)
        .map_err(|e| TransactionError::Io(e.to_string()))?;

    // Stage 11: the point of no return.
    transition_to_ponr(deps, &merged_name, version)?;
    journal.append(JournalStage::Ponr);

    // Stage 12: catalog update (skipped in `no_cluster` mode), then open
    // and register the merged region online. A failure here can no longer
    // roll back — it's surfaced to the caller as `Catalog`, distinct from
    // `Io`, precisely so the caller knows roll-forward is the only path.
    if !deps.no_cluster {
        deps.catalog
            .merge_regions(merged, region_a, region_b, origin)
            .map_err(|e| TransactionError::Catalog(e.to_string()))?;
    }
    if deps.registry.is_stopping() {
        return Err(TransactionError::Catalog(
            "region server began stopping before the merged region could be opened".to_owned(),
        ));
    }
    deps.host
        .open_merged_region(merged)
        .map_err(|e| TransactionError::Catalog(e.to_string()))?;
    deps.registry
        .add_online(&merged_name)
        .map_err(|e| TransactionError::Catalog(e.to_string()))?;

    Ok(())
}

/// Stages 2-3: create the ephemeral znode, then transition it
/// `MERGING -> MERGING` twice. No-ops (beyond the journal entry) in
/// `no_cluster` mode.
fn claim_in_coordination(
    deps: &ExecutorDeps<'_>,
    merged_name: &EncodedName,
    journal: &mut Journal,
) -> Result<i32, TransactionError> {
    if deps.no_cluster {
        journal.append(JournalStage::SetMergingInZk);
        return Ok(0);
    }

    let version = deps
        .coordination
        .create_ephemeral_merging(merged_name)
        .map_err(|e| TransactionError::Io(e.to_string()))?;
    journal.append(JournalStage::SetMergingInZk);

    let version = require_version(
        deps.coordination
            .transition_merging(merged_name, version, Vec::new())
            .map_err(|e| TransactionError::Io(e.to_string()))?,
    )?;
    let version = require_version(
        deps.coordination
            .transition_merging(merged_name, version, Vec::new())
            .map_err(|e| TransactionError::Io(e.to_string()))?,
    )?;
    Ok(version)
}

/// Stage 11: `MERGING -> MERGE`. No-op in `no_cluster` mode.
fn transition_to_ponr(
    deps: &ExecutorDeps<'_>,
    merged_name: &EncodedName,
    version: i32,
) -> Result<(), TransactionError> {
    if deps.no_cluster {
        return Ok(());
    }
    require_version(
        deps.coordination
            .transition_merge_final(merged_name, version, Vec::new())
            .map_err(|e| TransactionError::Io(e.to_string()))?,
    )?;
    Ok(())
}

/// A CAS transition returning `-1` means the caller lost ownership of the
/// merge (version race, or the znode vanished) — always a hard stop, since
/// nothing past this point can be trusted to still be ours.
fn require_version(version: i32) -> Result<i32, TransactionError> {
    if version < 0 {
        return Err(TransactionError::Io(
            "lost ownership of the merge znode (version mismatch or znode deleted)".to_owned(),
        ));
    }
    Ok(version)
}

fn link_store_files(
    deps: &ExecutorDeps<'_>,
    region: &RegionDescriptor,
    merges_dir: &std::path::Path,
) -> Result<(), TransactionError> {
    for family in &region.families {
        for store_file in &family.store_files {
            deps.linker
                .link(&family.name, store_file.as_path(), merges_dir)
                .map_err(|e| TransactionError::Io(e.to_string()))?;
        }
    }
    Ok(())
}

fn close_region(
    deps: &ExecutorDeps<'_>,
    region: &RegionDescriptor,
    stage: JournalStage,
    journal: &mut Journal,
) -> Result<(), TransactionError> {
    let handle = deps
        .registry
        .handle(&region.encoded_name())
        .ok_or_else(|| TransactionError::Io("region handle not found".to_owned()))?;
    match handle.close() {
        Ok(CloseOutcome::Closed) => {
            journal.append(stage);
            Ok(())
        }
        Ok(CloseOutcome::AlreadyClosed) => Err(TransactionError::ConcurrentClose {
            region: Box::new(region.clone()),
        }),
        Err(e) => Err(TransactionError::Io(e.to_string())),
    }
}

/// Undo a `ClosedRegion*` entry: re-initialize the region so it is neither
/// open nor closed but live again. An I/O failure here is a fatal rollback
/// failure — the region is now stuck in between.
fn reinitialize_region(deps: &ExecutorDeps<'_>, region: &RegionDescriptor) -> Result<(), String> {
    deps.registry
        .handle(&region.encoded_name())
        .ok_or_else(|| "region handle not found".to_owned())?
        .initialize()
        .map_err(|e| e.to_string())
}

/// Undo an `OfflinedRegion*` entry: put the region back in the
/// online-region registry.
fn reonline_region(deps: &ExecutorDeps<'_>, region: &RegionDescriptor) -> Result<(), String> {
    deps.registry
        .add_online(&region.encoded_name())
        .map_err(|e| e.to_string())
}

/// Undo every journaled stage in reverse order.
///
/// # Errors
/// Returns [`TransactionError::Rollback`] with
/// [`RollbackFailure::PastPonr`] if the journal already contains `PONR` —
/// rollback is refused, not attempted, past that point. Returns
/// [`RollbackFailure::UndoStepFailed`] if an individual undo step fails
/// (including re-initializing A or B); an unrecognized journal entry is a
/// programming error and this function panics rather than silently
/// ignoring it.
pub fn rollback(
    deps: &ExecutorDeps<'_>,
    region_a: &RegionDescriptor,
    region_b: &RegionDescriptor,
    merged: &MergedRegionDescriptor,
    journal: &mut Journal,
) -> Result<(), TransactionError> {
    if !journal.can_rollback() {
        return Err(TransactionError::Rollback(RollbackFailure::PastPonr));
    }

    let merged_name = merged.encoded_name();
    let stages: Vec<JournalStage> = journal.rollback_order().copied().collect();

    for stage in stages {
        let result = match stage {
            JournalStage::OfflinedRegionB => reonline_region(deps, region_b),
            JournalStage::ClosedRegionB => reinitialize_region(deps, region_b),
            JournalStage::OfflinedRegionA => reonline_region(deps, region_a),
            JournalStage::ClosedRegionA => reinitialize_region(deps, region_a),
            JournalStage::StartedMergedRegionCreation => deps
                .filesystem
                .cleanup_merged_region_dir(merged)
                .map_err(|e| e.to_string()),
            JournalStage::CreatedMergeDir => deps
                .filesystem
                .cleanup_merges_dir(region_a.encoded_name().as_str())
                .map_err(|e| e.to_string()),
            JournalStage::SetMergingInZk => {
                if deps.no_cluster {
                    Ok(())
                } else {
                    deps.coordination
                        .read(&merged_name)
                        .map_err(|e| e.to_string())
                        .and_then(|state| {
                            let version = state.map_or(0, |s| s.version);
                            deps.coordination
                                .delete_if_in_state(&merged_name, version)
                                .map_err(|e| e.to_string())
                        })
                }
            }
            JournalStage::Ponr => {
                unreachable!("rollback must have been refused before reaching PONR")
            }
        };

        if let Err(reason) = result {
            return Err(TransactionError::Rollback(RollbackFailure::UndoStepFailed {
                stage: stage.to_string(),
                reason,
            }));
        }
    }

    Ok(())
}
