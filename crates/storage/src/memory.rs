use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{
    CompletionRecord, ContentId, ContentItem, EnrollmentAggregate, EnrollmentKey, ModuleId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::repository::{
    CompletionStore, ContentCatalog, EnrollmentFilter, EnrollmentStore, Page, StorageError,
};
use crate::session::{ProgressSession, ProgressTransaction, TransactionProvider};

#[derive(Debug, Default)]
struct MemoryState {
    content: BTreeMap<ContentId, ContentItem>,
    completions: HashMap<(UserId, ContentId), CompletionRecord>,
    enrollments: BTreeMap<EnrollmentKey, EnrollmentAggregate>,
}

impl MemoryState {
    fn active_content(&self, module_id: ModuleId) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .content
            .values()
            .filter(|item| item.module_id == module_id && item.active)
            .cloned()
            .collect();
        // ids are already ascending, so a stable sort keeps them ordered within a section
        items.sort_by(|a, b| a.section.cmp(&b.section));
        items
    }

    fn completions_for(&self, user_id: UserId, content_ids: &[ContentId]) -> Vec<CompletionRecord> {
        content_ids
            .iter()
            .filter_map(|id| self.completions.get(&(user_id, *id)).cloned())
            .collect()
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Plain calls lock the state briefly. A transaction holds the lock for its
/// whole lifetime, so concurrent transactions run one after another.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentCatalog for InMemoryRepository {
    async fn list_active_content(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError> {
        Ok(self.state.lock().await.active_content(module_id))
    }

    async fn count_active_content(&self, module_id: ModuleId) -> Result<u32, StorageError> {
        let guard = self.state.lock().await;
        let count = guard
            .content
            .values()
            .filter(|item| item.module_id == module_id && item.active)
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("content count overflow".into()))
    }

    async fn upsert_content(&self, item: &ContentItem) -> Result<(), StorageError> {
        self.state.lock().await.content.insert(item.id, item.clone());
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for InMemoryRepository {
    async fn list_completions(
        &self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        Ok(self.state.lock().await.completions_for(user_id, content_ids))
    }

    async fn upsert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        self.state
            .lock()
            .await
            .completions
            .insert((record.user_id, record.content_id), record.clone());
        Ok(())
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryRepository {
    async fn get_enrollment(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError> {
        let guard = self.state.lock().await;
        Ok(guard
            .enrollments
            .get(&EnrollmentKey::new(user_id, module_id))
            .cloned())
    }

    async fn create_enrollment(
        &self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        let mut guard = self.state.lock().await;
        if guard.enrollments.contains_key(&enrollment.key()) {
            return Err(StorageError::Conflict);
        }
        guard.enrollments.insert(enrollment.key(), enrollment.clone());
        Ok(())
    }

    async fn update_enrollment(
        &self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        let mut guard = self.state.lock().await;
        match guard.enrollments.get_mut(&enrollment.key()) {
            Some(slot) => {
                *slot = enrollment.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    async fn bulk_update_total_sections(
        &self,
        module_id: ModuleId,
        total_sections: u32,
    ) -> Result<u64, StorageError> {
        let mut guard = self.state.lock().await;
        let mut touched = 0_u64;
        for enrollment in guard
            .enrollments
            .values_mut()
            .filter(|e| e.module_id() == module_id)
        {
            enrollment.set_total_sections(total_sections);
            touched += 1;
        }
        Ok(touched)
    }

    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
        page: Page,
    ) -> Result<Vec<EnrollmentAggregate>, StorageError> {
        let guard = self.state.lock().await;
        let skip = usize::try_from(page.offset).unwrap_or(usize::MAX);
        Ok(guard
            .enrollments
            .values()
            .filter(|e| filter.matches(&e.key()))
            .skip(skip)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count_enrollments(&self, filter: &EnrollmentFilter) -> Result<u64, StorageError> {
        let guard = self.state.lock().await;
        Ok(guard
            .enrollments
            .keys()
            .filter(|key| filter.matches(key))
            .count() as u64)
    }
}

//
// ─── TRANSACTIONS ──────────────────────────────────────────────────────────────
//

/// Exclusive view of the repository with enrollment writes staged until commit.
pub struct InMemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    staged: BTreeMap<EnrollmentKey, EnrollmentAggregate>,
}

#[async_trait]
impl TransactionProvider for InMemoryRepository {
    async fn begin(&self) -> Result<Box<dyn ProgressTransaction>, StorageError> {
        let state = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            state,
            staged: BTreeMap::new(),
        }))
    }
}

#[async_trait]
impl ProgressSession for InMemoryTransaction {
    async fn list_active_content(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError> {
        Ok(self.state.active_content(module_id))
    }

    async fn list_completions(
        &mut self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        Ok(self.state.completions_for(user_id, content_ids))
    }

    async fn get_enrollment(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError> {
        let key = EnrollmentKey::new(user_id, module_id);
        Ok(self
            .staged
            .get(&key)
            .or_else(|| self.state.enrollments.get(&key))
            .cloned())
    }

    async fn update_enrollment(
        &mut self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        let key = enrollment.key();
        if !self.staged.contains_key(&key) && !self.state.enrollments.contains_key(&key) {
            return Err(StorageError::NotFound);
        }
        self.staged.insert(key, enrollment.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressTransaction for InMemoryTransaction {
    fn as_session(&mut self) -> &mut dyn ProgressSession {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let InMemoryTransaction { mut state, staged } = *self;
        state.enrollments.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{CompletionStatus, ContentType};
    use progress_core::time::fixed_now;

    fn enrollment(user: u64, module: u64) -> EnrollmentAggregate {
        EnrollmentAggregate::new(UserId::new(user), ModuleId::new(module), fixed_now())
    }

    #[tokio::test]
    async fn active_content_is_filtered_and_ordered_by_section() {
        let repo = InMemoryRepository::new();
        let module = ModuleId::new(1);
        repo.upsert_content(
            &ContentItem::new(ContentId::new(3), module, ContentType::Lab, "c").with_section("a"),
        )
        .await
        .unwrap();
        repo.upsert_content(
            &ContentItem::new(ContentId::new(1), module, ContentType::Video, "a").with_section("b"),
        )
        .await
        .unwrap();
        repo.upsert_content(
            &ContentItem::new(ContentId::new(2), module, ContentType::Game, "b")
                .with_section("a")
                .inactive(),
        )
        .await
        .unwrap();
        repo.upsert_content(&ContentItem::new(
            ContentId::new(4),
            ModuleId::new(2),
            ContentType::Video,
            "other",
        ))
        .await
        .unwrap();

        let items = repo.list_active_content(module).await.unwrap();
        let ids: Vec<u64> = items.iter().map(|i| i.id.value()).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(repo.count_active_content(module).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn completions_are_scoped_to_user_and_ids() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        for id in 1..=3 {
            repo.upsert_completion(&CompletionRecord::new(
                user,
                ContentId::new(id),
                CompletionStatus::Completed,
            ))
            .await
            .unwrap();
        }
        repo.upsert_completion(&CompletionRecord::new(
            UserId::new(2),
            ContentId::new(1),
            CompletionStatus::Completed,
        ))
        .await
        .unwrap();

        let found = repo
            .list_completions(user, &[ContentId::new(1), ContentId::new(3), ContentId::new(9)])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.user_id == user));
    }

    #[tokio::test]
    async fn update_requires_existing_enrollment() {
        let repo = InMemoryRepository::new();
        let err = repo.update_enrollment(&enrollment(1, 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));

        repo.create_enrollment(&enrollment(1, 1)).await.unwrap();
        repo.update_enrollment(&enrollment(1, 1)).await.unwrap();
        let dup = repo.create_enrollment(&enrollment(1, 1)).await.unwrap_err();
        assert!(matches!(dup, StorageError::Conflict));
    }

    #[tokio::test]
    async fn listing_paginates_in_key_order() {
        let repo = InMemoryRepository::new();
        for (user, module) in [(2, 1), (1, 2), (1, 1), (3, 1)] {
            repo.create_enrollment(&enrollment(user, module)).await.unwrap();
        }

        let filter = EnrollmentFilter::all();
        let first = repo.list_enrollments(&filter, Page::first(3)).await.unwrap();
        let second = repo
            .list_enrollments(&filter, Page::first(3).next())
            .await
            .unwrap();

        let keys: Vec<(u64, u64)> = first
            .iter()
            .chain(second.iter())
            .map(|e| (e.user_id().value(), e.module_id().value()))
            .collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1), (3, 1)]);
        assert_eq!(
            repo.count_enrollments(&EnrollmentFilter::for_module(ModuleId::new(1)))
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn bulk_total_update_touches_only_the_module() {
        let repo = InMemoryRepository::new();
        repo.create_enrollment(&enrollment(1, 1)).await.unwrap();
        repo.create_enrollment(&enrollment(2, 1)).await.unwrap();
        repo.create_enrollment(&enrollment(1, 2)).await.unwrap();

        let touched = repo
            .bulk_update_total_sections(ModuleId::new(1), 7)
            .await
            .unwrap();

        assert_eq!(touched, 2);
        let other = repo
            .get_enrollment(UserId::new(1), ModuleId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.total_sections(), 0);
    }

    #[tokio::test]
    async fn rolled_back_transaction_discards_writes() {
        let repo = InMemoryRepository::new();
        repo.create_enrollment(&enrollment(1, 1)).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let mut updated = tx
            .get_enrollment(UserId::new(1), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        updated.set_total_sections(9);
        tx.update_enrollment(&updated).await.unwrap();
        tx.rollback().await.unwrap();

        let stored = repo
            .get_enrollment(UserId::new(1), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.total_sections(), 0);
    }

    #[tokio::test]
    async fn committed_transaction_applies_staged_writes() {
        let repo = InMemoryRepository::new();
        repo.create_enrollment(&enrollment(1, 1)).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let mut updated = enrollment(1, 1);
        updated.set_total_sections(4);
        tx.update_enrollment(&updated).await.unwrap();
        let staged = tx
            .get_enrollment(UserId::new(1), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(staged.total_sections(), 4);
        tx.commit().await.unwrap();

        let stored = repo
            .get_enrollment(UserId::new(1), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.total_sections(), 4);
    }

    #[tokio::test]
    async fn open_transaction_blocks_plain_writers() {
        let repo = InMemoryRepository::new();
        repo.create_enrollment(&enrollment(1, 1)).await.unwrap();

        let tx = repo.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            repo.update_enrollment(&enrollment(1, 1)),
        )
        .await;
        assert!(blocked.is_err());

        tx.commit().await.unwrap();
        repo.update_enrollment(&enrollment(1, 1)).await.unwrap();
    }
}
