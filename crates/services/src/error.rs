//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{SnapshotError, SummaryError};
use storage::repository::StorageError;

/// Errors emitted by the entitlement admin surface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by session services.
///
/// The transition variants (`NoSelection`, `AlreadyRevealed`,
/// `NotRevealed`, `Finished`) flag controller bugs: they are never a user
/// condition, and never silently absorbed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,

    #[error("session already finished")]
    Finished,

    #[error("cannot confirm with no option selected")]
    NoSelection,

    #[error("question already revealed")]
    AlreadyRevealed,

    #[error("cannot advance before the answer is revealed")]
    NotRevealed,

    #[error("option index {0} is out of range")]
    InvalidOption(u8),

    #[error("fetched working set does not match the saved session")]
    WorkingSetMismatch,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Summary(#[from] SummaryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
