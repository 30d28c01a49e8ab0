use std::sync::Arc;

use futures::future::join_all;
use progress_core::model::{EnrollmentKey, ModuleId, UserId};
use serde::Serialize;
use storage::repository::{EnrollmentFilter, Page, StorageError};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ProgressSyncService, SyncMode, SyncOutcome};
use crate::error::SyncError;

/// Knobs for a whole-catalog recalculation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    /// Enrollments loaded and synced concurrently per page. `None` uses the
    /// service's configured batch size.
    pub batch_size: Option<u32>,
    /// Compute without writing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub error: String,
}

/// Settled results of a multi-enrollment sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_enrollments: u64,
    /// Enrollments examined without error, including ones found missing.
    pub processed: u64,
    /// Aggregates actually written.
    pub updated: u64,
    /// Enrollments that disappeared between listing and sync.
    pub missing: u64,
    pub errors: u64,
    pub failures: Vec<SyncFailure>,
}

impl BatchSummary {
    #[must_use]
    pub fn new(total_enrollments: u64) -> Self {
        Self {
            total_enrollments,
            ..Self::default()
        }
    }

    /// Fold one settled sync into the summary.
    pub fn record(&mut self, key: EnrollmentKey, result: Result<Option<SyncOutcome>, SyncError>) {
        match result {
            Ok(Some(outcome)) => {
                self.processed += 1;
                if outcome.persisted {
                    self.updated += 1;
                }
            }
            Ok(None) | Err(SyncError::Storage(StorageError::NotFound)) => {
                self.processed += 1;
                self.missing += 1;
            }
            Err(err) => {
                warn!(
                    user_id = %key.user_id,
                    module_id = %key.module_id,
                    error = %err,
                    "enrollment sync failed"
                );
                self.errors += 1;
                self.failures.push(SyncFailure {
                    user_id: key.user_id,
                    module_id: key.module_id,
                    error: err.to_string(),
                });
            }
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

impl ProgressSyncService {
    /// Recompute every enrollment, one page at a time.
    ///
    /// Items within a page run concurrently and are all settled before the
    /// next page loads. A failing item is recorded in the summary and does
    /// not stop the run.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` only if counting or listing enrollments
    /// fails; per-enrollment failures end up in `BatchSummary::failures`.
    pub async fn bulk_recalculate_progress(
        &self,
        options: BulkOptions,
    ) -> Result<BatchSummary, SyncError> {
        let filter = EnrollmentFilter::all();
        let mode = if options.dry_run {
            SyncMode::DryRun
        } else {
            SyncMode::Persist
        };
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size);

        let total = self.storage.enrollments.count_enrollments(&filter).await?;
        let mut summary = BatchSummary::new(total);
        info!(total, batch_size, dry_run = options.dry_run, "bulk recalculation started");

        let mut page = Page::first(batch_size);
        loop {
            let enrollments = self.storage.enrollments.list_enrollments(&filter, page).await?;
            if enrollments.is_empty() {
                break;
            }
            let short_page = enrollments.len() < page.limit as usize;

            let keys: Vec<EnrollmentKey> = enrollments.iter().map(|e| e.key()).collect();
            let results = join_all(
                keys.iter()
                    .map(|key| self.sync_with(None, key.user_id, key.module_id, mode)),
            )
            .await;
            for (key, result) in keys.into_iter().zip(results) {
                summary.record(key, result);
            }

            debug!(offset = page.offset, processed = summary.processed, "page settled");
            if short_page {
                break;
            }
            page = page.next();
        }

        info!(
            total = summary.total_enrollments,
            processed = summary.processed,
            updated = summary.updated,
            missing = summary.missing,
            errors = summary.errors,
            "bulk recalculation finished"
        );
        Ok(summary)
    }

    /// Sync every enrollment a learner holds, concurrently.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the enrollments cannot be counted or listed.
    pub async fn sync_user_enrollments(&self, user_id: UserId) -> Result<BatchSummary, SyncError> {
        self.fan_out(EnrollmentFilter::for_user(user_id)).await
    }

    /// Sync every enrollment in a module, concurrently.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the enrollments cannot be counted or listed.
    pub async fn sync_module_enrollments(
        &self,
        module_id: ModuleId,
    ) -> Result<BatchSummary, SyncError> {
        self.fan_out(EnrollmentFilter::for_module(module_id)).await
    }

    /// Sync matching enrollments one page of `batch_size` at a time.
    ///
    /// Each page spawns one task per enrollment, at most `max_concurrency`
    /// running at once, and every task settles before the next page loads.
    async fn fan_out(&self, filter: EnrollmentFilter) -> Result<BatchSummary, SyncError> {
        let total = self.storage.enrollments.count_enrollments(&filter).await?;
        let mut summary = BatchSummary::new(total);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut page = Page::first(self.config.batch_size);
        loop {
            let enrollments = self.storage.enrollments.list_enrollments(&filter, page).await?;
            if enrollments.is_empty() {
                break;
            }
            let short_page = enrollments.len() < page.limit as usize;

            let keys: Vec<EnrollmentKey> = enrollments.iter().map(|e| e.key()).collect();
            let handles = keys.iter().map(|key| {
                let service = self.clone();
                let permits = Arc::clone(&permits);
                let key = *key;
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| SyncError::Task(e.to_string()))?;
                    service
                        .sync_enrollment_progress(key.user_id, key.module_id)
                        .await
                })
            });

            let settled = join_all(handles).await;
            for (key, joined) in keys.into_iter().zip(settled) {
                let result = joined.unwrap_or_else(|e| Err(SyncError::Task(e.to_string())));
                summary.record(key, result);
            }

            if short_page {
                break;
            }
            page = page.next();
        }

        info!(
            user_id = ?filter.user_id,
            module_id = ?filter.module_id,
            total = summary.total_enrollments,
            processed = summary.processed,
            updated = summary.updated,
            errors = summary.errors,
            "fan-out sync finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::EnrollmentAggregate;
    use progress_core::time::fixed_now;

    fn outcome(persisted: bool) -> SyncOutcome {
        let enrollment = EnrollmentAggregate::new(UserId::new(1), ModuleId::new(1), fixed_now());
        SyncOutcome {
            enrollment,
            snapshot: progress_core::model::ProgressSnapshot::empty(),
            applied: progress_core::model::AppliedProgress::default(),
            repair: None,
            persisted,
        }
    }

    #[test]
    fn summary_counts_each_kind_of_result() {
        let key = EnrollmentKey::new(UserId::new(1), ModuleId::new(1));
        let mut summary = BatchSummary::new(5);

        summary.record(key, Ok(Some(outcome(true))));
        summary.record(key, Ok(Some(outcome(false))));
        summary.record(key, Ok(None));
        summary.record(key, Err(SyncError::Storage(StorageError::NotFound)));
        summary.record(
            key,
            Err(SyncError::Storage(StorageError::Connection("gone".into()))),
        );

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.missing, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].error, "connection error: gone");
        assert!(!summary.is_clean());
    }
}
