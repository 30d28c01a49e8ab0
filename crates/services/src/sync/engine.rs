use progress_core::aggregate;
use progress_core::model::{ContentId, ModuleId, ProgressSnapshot, UserId};
use storage::repository::StorageError;
use storage::session::ProgressSession;
use tracing::{debug, info, warn};

use super::{ProgressSyncService, SyncMode, SyncOutcome};
use crate::error::SyncError;

/// Load the module's active content and the learner's matching records
/// through `session`, then aggregate.
pub(super) async fn read_snapshot(
    session: &mut dyn ProgressSession,
    user_id: UserId,
    module_id: ModuleId,
) -> Result<ProgressSnapshot, StorageError> {
    let items = session.list_active_content(module_id).await?;
    if items.is_empty() {
        return Ok(ProgressSnapshot::empty());
    }

    let content_ids: Vec<ContentId> = items.iter().map(|item| item.id).collect();
    let completions = session.list_completions(user_id, &content_ids).await?;

    Ok(aggregate(&items, &completions))
}

impl ProgressSyncService {
    /// Recompute and persist one enrollment's aggregate.
    ///
    /// Returns `Ok(None)` when no enrollment exists for the pair; callers may
    /// invoke this speculatively.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if any read or the final write fails.
    pub async fn sync_enrollment_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        self.sync_with(None, user_id, module_id, SyncMode::Persist)
            .await
    }

    /// Same as `sync_enrollment_progress`, but every read and the write go
    /// through the caller's session.
    ///
    /// The caller owns the transaction: on `Err` it should roll back, on
    /// `Ok` it decides when to commit.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if any read or the final write fails.
    pub async fn sync_enrollment_progress_atomic(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        session: &mut dyn ProgressSession,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        self.sync_with(Some(session), user_id, module_id, SyncMode::Persist)
            .await
    }

    /// Open a transaction, run the atomic sync in it, and commit.
    ///
    /// The transaction is rolled back if the sync fails.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the transaction cannot be opened, the
    /// sync fails, or the commit fails.
    pub async fn sync_enrollment_in_transaction(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let mut tx = self.storage.transactions.begin().await?;

        let result = self
            .sync_with(Some(tx.as_session()), user_id, module_id, SyncMode::Persist)
            .await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        %user_id,
                        %module_id,
                        error = %rollback_err,
                        "rollback after failed sync also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Run the full computation for one enrollment without writing it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if any read fails.
    pub async fn preview_enrollment_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        self.sync_with(None, user_id, module_id, SyncMode::DryRun)
            .await
    }

    /// Live snapshot for a learner in a module, read straight from the stores.
    ///
    /// Does not require an enrollment and never writes.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the catalog or completion store fails.
    pub async fn module_snapshot(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<ProgressSnapshot, SyncError> {
        let mut session = self.storage.session();
        Ok(read_snapshot(&mut session, user_id, module_id).await?)
    }

    /// Live snapshot read through the caller's session, so it observes the
    /// same state as a write made later in that session.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if a read fails.
    pub async fn module_snapshot_in(
        &self,
        session: &mut dyn ProgressSession,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<ProgressSnapshot, SyncError> {
        Ok(read_snapshot(session, user_id, module_id).await?)
    }

    /// The one sync implementation behind every single-enrollment entry point.
    pub(crate) async fn sync_with(
        &self,
        session: Option<&mut dyn ProgressSession>,
        user_id: UserId,
        module_id: ModuleId,
        mode: SyncMode,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        match session {
            Some(session) => self.sync_in(session, user_id, module_id, mode).await,
            None => {
                let mut session = self.storage.session();
                self.sync_in(&mut session, user_id, module_id, mode).await
            }
        }
    }

    async fn sync_in(
        &self,
        session: &mut dyn ProgressSession,
        user_id: UserId,
        module_id: ModuleId,
        mode: SyncMode,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let Some(mut enrollment) = session.get_enrollment(user_id, module_id).await? else {
            warn!(%user_id, %module_id, "no enrollment to sync");
            return Ok(None);
        };

        let mut snapshot = read_snapshot(session, user_id, module_id).await?;

        let repair = snapshot.repair();
        if let Some(repair) = &repair {
            warn!(
                %user_id,
                %module_id,
                completed = repair.observed_completed,
                total = repair.observed_total,
                percentage = repair.observed_percentage,
                "progress counts out of range, clamped before write"
            );
        }

        let applied = enrollment.apply_snapshot(&snapshot, self.clock.now());
        if applied.newly_completed {
            info!(%user_id, %module_id, "enrollment completed");
        }

        let persisted = match mode {
            SyncMode::Persist => {
                session.update_enrollment(&enrollment).await?;
                true
            }
            SyncMode::DryRun => false,
        };

        debug!(
            %user_id,
            %module_id,
            completed = enrollment.completed_sections(),
            total = enrollment.total_sections(),
            percentage = enrollment.progress_percentage(),
            persisted,
            "enrollment synced"
        );

        Ok(Some(SyncOutcome {
            enrollment,
            snapshot,
            applied,
            repair,
            persisted,
        }))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{
        CompletionRecord, CompletionStatus, ContentItem, ContentType, EnrollmentAggregate,
        EnrollmentStatus, TypeProgress,
    };
    use progress_core::time::fixed_now;
    use progress_core::Clock;
    use storage::repository::{CompletionStore, ContentCatalog, EnrollmentStore, Storage};
    use storage::InMemoryRepository;

    const USER: UserId = UserId::new(1);
    const MODULE: ModuleId = ModuleId::new(10);

    async fn seeded() -> (InMemoryRepository, ProgressSyncService) {
        let repo = InMemoryRepository::new();
        let items = [
            (1, ContentType::Video),
            (2, ContentType::Video),
            (3, ContentType::Lab),
            (4, ContentType::Game),
        ];
        for (id, content_type) in items {
            repo.upsert_content(&ContentItem::new(
                ContentId::new(id),
                MODULE,
                content_type,
                format!("Item {id}"),
            ))
            .await
            .unwrap();
        }
        repo.create_enrollment(&EnrollmentAggregate::new(USER, MODULE, fixed_now()))
            .await
            .unwrap();

        let service = ProgressSyncService::new(
            Clock::fixed(fixed_now()),
            Storage::from_repository(repo.clone()),
        );
        (repo, service)
    }

    async fn complete(repo: &InMemoryRepository, id: u64) {
        repo.upsert_completion(&CompletionRecord::new(
            USER,
            ContentId::new(id),
            CompletionStatus::Completed,
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn sync_writes_counts_and_breakdown() {
        let (repo, service) = seeded().await;
        for id in [1, 2, 3] {
            complete(&repo, id).await;
        }

        let outcome = service
            .sync_enrollment_progress(USER, MODULE)
            .await
            .unwrap()
            .expect("enrollment exists");

        assert!(outcome.persisted);
        assert_eq!(outcome.snapshot.by_type.video, TypeProgress { completed: 2, total: 2 });
        assert_eq!(outcome.snapshot.by_type.lab, TypeProgress { completed: 1, total: 1 });
        assert_eq!(outcome.snapshot.by_type.game, TypeProgress { completed: 0, total: 1 });

        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.total_sections(), 4);
        assert_eq!(stored.completed_sections(), 3);
        assert_eq!(stored.progress_percentage(), 75);
        assert_eq!(stored.status(), EnrollmentStatus::Active);
        assert_eq!(stored.last_accessed_at(), Some(fixed_now()));
    }

    #[tokio::test]
    async fn missing_enrollment_is_a_soft_no_op() {
        let (_repo, service) = seeded().await;
        let outcome = service
            .sync_enrollment_progress(UserId::new(99), MODULE)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn reaching_hundred_percent_completes_enrollment() {
        let (repo, service) = seeded().await;
        for id in 1..=4 {
            complete(&repo, id).await;
        }

        let outcome = service
            .sync_enrollment_progress(USER, MODULE)
            .await
            .unwrap()
            .unwrap();

        assert!(outcome.applied.newly_completed);
        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.status(), EnrollmentStatus::Completed);
        assert_eq!(stored.progress_percentage(), 100);
    }

    #[tokio::test]
    async fn preview_does_not_write() {
        let (repo, service) = seeded().await;
        complete(&repo, 1).await;

        let outcome = service
            .preview_enrollment_progress(USER, MODULE)
            .await
            .unwrap()
            .unwrap();

        assert!(!outcome.persisted);
        assert_eq!(outcome.enrollment.completed_sections(), 1);
        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.completed_sections(), 0);
        assert_eq!(stored.last_accessed_at(), None);
    }

    #[tokio::test]
    async fn atomic_sync_is_invisible_until_commit() {
        let (repo, service) = seeded().await;
        complete(&repo, 1).await;

        let mut tx = service.storage().transactions.begin().await.unwrap();
        let outcome = service
            .sync_enrollment_progress_atomic(USER, MODULE, tx.as_session())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.enrollment.completed_sections(), 1);
        tx.rollback().await.unwrap();

        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.completed_sections(), 0);

        service
            .sync_enrollment_in_transaction(USER, MODULE)
            .await
            .unwrap()
            .unwrap();
        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.completed_sections(), 1);
    }

    #[tokio::test]
    async fn snapshot_reads_need_no_enrollment() {
        let (repo, service) = seeded().await;
        complete(&repo, 4).await;

        let snapshot = service.module_snapshot(UserId::new(2), MODULE).await.unwrap();
        assert_eq!(snapshot.total_sections, 4);
        assert_eq!(snapshot.completed_sections, 0);

        let empty = service
            .module_snapshot(USER, ModuleId::new(404))
            .await
            .unwrap();
        assert_eq!(empty, ProgressSnapshot::empty());
    }

    #[tokio::test]
    async fn session_snapshot_reads_inside_an_open_transaction() {
        let (repo, service) = seeded().await;
        complete(&repo, 2).await;

        let mut tx = service.storage().transactions.begin().await.unwrap();
        let outcome = service
            .sync_enrollment_progress_atomic(USER, MODULE, tx.as_session())
            .await
            .unwrap()
            .unwrap();

        // the plain read path would wait on the lock this transaction holds
        let snapshot = service
            .module_snapshot_in(tx.as_session(), USER, MODULE)
            .await
            .unwrap();
        assert_eq!(snapshot, outcome.snapshot);
        let staged = tx.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(staged.completed_sections(), snapshot.completed_sections);
        tx.commit().await.unwrap();

        let stored = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(stored.completed_sections(), 1);
    }

    #[tokio::test]
    async fn each_persisted_sync_restamps_last_access() {
        let (repo, service) = seeded().await;
        service.sync_enrollment_progress(USER, MODULE).await.unwrap();
        let first = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(first.last_accessed_at(), Some(fixed_now()));

        let mut clock = Clock::fixed(fixed_now());
        clock.advance(chrono::Duration::hours(2));
        let later = ProgressSyncService::new(clock, service.storage().clone());
        later.preview_enrollment_progress(USER, MODULE).await.unwrap();
        let unchanged = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(unchanged.last_accessed_at(), Some(fixed_now()));

        later.sync_enrollment_progress(USER, MODULE).await.unwrap();
        let second = repo.get_enrollment(USER, MODULE).await.unwrap().unwrap();
        assert_eq!(
            second.last_accessed_at(),
            Some(fixed_now() + chrono::Duration::hours(2))
        );
        assert_eq!(second.completed_sections(), first.completed_sections());
    }
}
