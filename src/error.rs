//! The error taxonomy for a region-merge transaction.
//!
//! Five kinds of failure, matching five different caller-visible
//! consequences:
//!
//! - [`TransactionError::Validation`]: `prepare` rejected the pair outright;
//!   no side effects happened, nothing to roll back.
//! - [`TransactionError::Io`]: a transient I/O failure (coordination
//!   service, filesystem, catalog) that the executor treats as a rollback
//!   trigger unless it occurs after the PONR.
//! - [`TransactionError::ConcurrentClose`]: a region was already closed by
//!   another thread before this transaction reached it; the transaction
//!   fails and whatever had already been journaled is rolled back.
//! - [`TransactionError::Catalog`]: the catalog update failed. Before the
//!   PONR this rolls back; after it, roll-forward is the only option.
//! - [`TransactionError::Rollback`]: rollback itself failed, or rollback
//!   was refused because the transaction was past the PONR.

use std::fmt;

use crate::model::ids;
use crate::model::region::RegionDescriptor;

#[derive(Debug)]
pub enum TransactionError {
    /// The region pair failed a prepare-time validation clause.
    Validation(ValidationReason),
    /// A transient I/O failure against the coordination service, the
    /// filesystem, or the catalog.
    Io(String),
    /// A region was already closed by another thread before this
    /// transaction attempted to close it.
    ConcurrentClose { region: Box<RegionDescriptor> },
    /// The catalog update failed.
    Catalog(String),
    /// Rollback failed, or was refused because the journal already
    /// contains [`crate::journal::JournalStage::Ponr`].
    Rollback(RollbackFailure),
    #[cfg(feature = "failpoints")]
    Failpoint(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    DifferentTables,
    SameRegion,
    NotAdjacent,
    NotMergeable { region: Box<crate::model::ids::EncodedName> },
    AlreadyMerging { region: Box<crate::model::ids::EncodedName> },
    /// The catalog could not be read to check for an existing merge
    /// qualifier. Treated as a rejection, not a propagated error.
    CatalogUnavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackFailure {
    /// Rollback was refused because the journal already contains PONR.
    PastPonr,
    /// An undo step itself failed.
    UndoStepFailed { stage: String, reason: String },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(reason) => write!(f, "validation failed: {reason}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::ConcurrentClose { region } => {
                write!(
                    f,
                    "region {} was already closed by another thread",
                    region.encoded_name()
                )
            }
            Self::Catalog(msg) => write!(f, "catalog update failed: {msg}"),
            Self::Rollback(failure) => write!(f, "rollback failed: {failure}"),
            #[cfg(feature = "failpoints")]
            Self::Failpoint(msg) => write!(f, "failpoint triggered: {msg}"),
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DifferentTables => write!(f, "regions belong to different tables"),
            Self::SameRegion => write!(f, "region cannot be merged with itself"),
            Self::NotAdjacent => write!(f, "regions are not adjacent"),
            Self::NotMergeable { region } => write!(f, "region {region} is not mergeable"),
            Self::AlreadyMerging { region } => {
                write!(f, "region {region} already has a merge qualifier recorded")
            }
            Self::CatalogUnavailable { reason } => {
                write!(f, "could not check catalog merge qualifiers: {reason}")
            }
        }
    }
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastPonr => write!(f, "refused: transaction is past the point of no return"),
            Self::UndoStepFailed { stage, reason } => {
                write!(f, "undo step {stage} failed: {reason}")
            }
        }
    }
}

impl std::error::Error for TransactionError {}
impl std::error::Error for ValidationReason {}
impl std::error::Error for RollbackFailure {}

impl From<ids::ValidationError> for TransactionError {
    fn from(e: ids::ValidationError) -> Self {
        Self::Io(e.to_string())
    }
}
