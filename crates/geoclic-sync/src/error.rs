//! Error types for storage adapters and the sync engine.

use geoclic_core::TransitionError;
use thiserror::Error;

/// Failure reported by a storage adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend cannot be reached or the connection was lost.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write violated a storage constraint or carried an unstorable value.
    /// Scoped to the statement; the transaction remains usable after a
    /// savepoint rollback.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A row that must exist does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the failure affects only the statement that raised it.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, Self::Constraint(_) | Self::NotFound(_))
    }
}

/// Failure of a whole sync-engine operation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request itself is invalid (not a per-item problem).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller's grant or role does not cover the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The addressed resource changed underneath the operation.
    #[error("{0}")]
    Conflict(String),

    /// A moderation action is not valid from the current status.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Storage failed for the session as a whole.
    #[error(transparent)]
    Store(#[from] StoreError),
}
