mod batch;
mod engine;
mod sections;
mod view;

use progress_core::Clock;
use progress_core::model::{AppliedProgress, EnrollmentAggregate, InvariantRepair, ProgressSnapshot};
use serde::Serialize;
use storage::repository::Storage;

use crate::config::SyncConfig;
use crate::error::AppServicesError;

pub use batch::{BatchSummary, BulkOptions, SyncFailure};
pub use sections::SectionCountUpdate;
pub use view::EnhancedEnrollment;

/// Whether a sync writes its result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Persist,
    /// Compute everything, skip the write.
    DryRun,
}

/// Result of syncing one enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// The aggregate as written (or as it would have been written in a dry run).
    pub enrollment: EnrollmentAggregate,
    pub snapshot: ProgressSnapshot,
    pub applied: AppliedProgress,
    pub repair: Option<InvariantRepair>,
    pub persisted: bool,
}

/// Keeps enrollment aggregates consistent with per-content completion records.
///
/// Holds only store handles; aggregates are loaded fresh for every call and
/// never cached between calls.
#[derive(Clone)]
pub struct ProgressSyncService {
    clock: Clock,
    storage: Storage,
    config: SyncConfig,
}

impl ProgressSyncService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        Self {
            clock,
            storage,
            config: SyncConfig::default(),
        }
    }

    /// Build a service backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn sqlite(
        db_url: &str,
        clock: Clock,
        config: SyncConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(clock, storage).with_config(config))
    }

    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config.normalized();
        self
    }

    #[must_use]
    pub fn config(&self) -> SyncConfig {
        self.config
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
