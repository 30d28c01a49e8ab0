//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressSyncService`.
///
/// A missing enrollment is not an error (`Ok(None)`), and invariant
/// violations are repaired in place, so only storage and task failures
/// surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("sync task failed: {0}")]
    Task(String),
}

/// Errors emitted while bootstrapping the service stack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
