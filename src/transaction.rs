//! Top-level orchestration: wires the preparer, executor, and controller
//! handshake into the full merge attempt a caller actually runs.
//!
//! A [`RegionMergeTransaction`] is constructed once per region pair and
//! consumed by [`RegionMergeTransaction::run`]. It is not reentrant and not
//! thread-safe — the same pattern as the executor's journal, which assumes
//! a single writer driving it from prepare through rollback or handoff.

use std::path::PathBuf;

use crate::catalog::{CatalogClient, MergeOrigin};
use crate::config::RegionMergeConfig;
use crate::coordination::CoordinationClient;
use crate::error::{TransactionError, ValidationReason};
use crate::executor::{self, ExecutorDeps};
use crate::filesystem::{FilesystemAdapter, StoreFileLinker};
use crate::handshake;
use crate::journal::JournalFile;
use crate::lifecycle::{HostLifecycle, RegionRegistry};
use crate::model::ids::RegionId;
use crate::model::region::{MergedRegionDescriptor, RegionDescriptor};
use crate::preparer::{self, PrepareOutcome};

/// The result of running a transaction to completion.
#[derive(Debug)]
pub enum TransactionOutcome {
    /// The pair was merged and the merged region is open.
    Completed { merged: MergedRegionDescriptor },
    /// Prepare-time validation rejected the pair. No side effects
    /// occurred; there is nothing to roll back.
    Rejected(ValidationReason),
}

/// A single merge attempt for one region pair.
///
/// # Invariants
/// - `run` may be called at most once per instance.
pub struct RegionMergeTransaction<'a> {
    region_a: RegionDescriptor,
    region_b: RegionDescriptor,
    forcible: bool,
    origin: MergeOrigin,
    config: RegionMergeConfig,
    state_dir: PathBuf,
    coordination: &'a dyn CoordinationClient,
    catalog: &'a dyn CatalogClient,
    host: &'a dyn HostLifecycle,
    registry: &'a dyn RegionRegistry,
    filesystem: &'a FilesystemAdapter,
    linker: &'a dyn StoreFileLinker,
}

impl<'a> RegionMergeTransaction<'a> {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        region_a: RegionDescriptor,
        region_b: RegionDescriptor,
        forcible: bool,
        origin: MergeOrigin,
        config: RegionMergeConfig,
        state_dir: PathBuf,
        coordination: &'a dyn CoordinationClient,
        catalog: &'a dyn CatalogClient,
        host: &'a dyn HostLifecycle,
        registry: &'a dyn RegionRegistry,
        filesystem: &'a FilesystemAdapter,
        linker: &'a dyn StoreFileLinker,
    ) -> Self {
        Self {
            region_a,
            region_b,
            forcible,
            origin,
            config,
            state_dir,
            coordination,
            catalog,
            host,
            registry,
            filesystem,
            linker,
        }
    }

    /// Run prepare, then (if accepted) execute and the controller
    /// handshake, in order.
    ///
    /// A validation rejection is returned as
    /// [`TransactionOutcome::Rejected`], not an error: the pair was never
    /// touched. Everything from the execute stage onward is a hard
    /// [`TransactionError`] since by then the transaction has taken
    /// effect and the caller needs to know precisely what happened.
    ///
    /// # Errors
    /// Returns whatever [`executor::execute`] or
    /// [`handshake::run_handshake`] returns.
    pub fn run(self, now: RegionId) -> Result<TransactionOutcome, TransactionError> {
        let outcome = preparer::prepare(
            &self.region_a,
            &self.region_b,
            self.forcible,
            self.catalog,
            now,
        );

        let (merged, clock_behind) = match outcome {
            PrepareOutcome::Rejected(reason) => return Ok(TransactionOutcome::Rejected(reason)),
            PrepareOutcome::Accepted { merged, clock_behind } => (merged, clock_behind),
        };
        if clock_behind {
            tracing::warn!(
                region = %merged.encoded_name(),
                "local clock is behind both source regions; merged region id was advanced past it",
            );
        }

        let no_cluster = self.config.testing.no_cluster;
        let deps = ExecutorDeps {
            coordination: self.coordination,
            catalog: self.catalog,
            host: self.host,
            registry: self.registry,
            filesystem: self.filesystem,
            linker: self.linker,
            no_cluster,
        };

        let journal = executor::execute(&deps, &self.region_a, &self.region_b, &merged, &self.origin)?;

        let journal_file = JournalFile {
            merged: merged.clone(),
            region_a: self.region_a.clone(),
            region_b: self.region_b.clone(),
            znode_version: 0,
            entries: journal.entries().to_vec(),
        };
        let path = JournalFile::default_path(&self.state_dir, &merged.encoded_name());
        if let Err(e) = journal_file.write_atomic(&path) {
            tracing::warn!(error = %e, "failed to persist completed journal for crash recovery");
        }

        handshake::run_handshake(
            self.coordination,
            self.host,
            self.registry,
            &merged,
            0,
            self.config.executor.open_log_interval_ms,
            no_cluster,
        )?;

        Ok(TransactionOutcome::Completed { merged })
    }
}
