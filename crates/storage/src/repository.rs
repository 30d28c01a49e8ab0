use std::sync::Arc;

use async_trait::async_trait;
use progress_core::model::{
    CompletionRecord, ContentId, ContentItem, EnrollmentAggregate, EnrollmentKey, ModuleId, UserId,
};
use thiserror::Error;

use crate::memory::InMemoryRepository;
use crate::session::{StoreSession, TransactionProvider};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── QUERY SHAPES ──────────────────────────────────────────────────────────────
//

/// Which enrollments a listing covers. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub user_id: Option<UserId>,
    pub module_id: Option<ModuleId>,
}

impl EnrollmentFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            module_id: None,
        }
    }

    #[must_use]
    pub fn for_module(module_id: ModuleId) -> Self {
        Self {
            user_id: None,
            module_id: Some(module_id),
        }
    }

    #[must_use]
    pub fn matches(&self, key: &EnrollmentKey) -> bool {
        self.user_id.is_none_or(|u| u == key.user_id)
            && self.module_id.is_none_or(|m| m == key.module_id)
    }
}

/// Offset pagination over enrollments ordered by `(user_id, module_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u32,
}

impl Page {
    #[must_use]
    pub fn first(limit: u32) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            offset: self.offset + u64::from(self.limit),
            limit: self.limit,
        }
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read side of the content catalog, plus the write used by catalog tooling.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Active content for a module, ordered by section then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_active_content(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError>;

    /// Number of active content items for a module, counted by the store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn count_active_content(&self, module_id: ModuleId) -> Result<u32, StorageError>;

    /// Insert or replace a content item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn upsert_content(&self, item: &ContentItem) -> Result<(), StorageError>;
}

#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// A learner's completion records restricted to `content_ids`.
    ///
    /// Content without a record is simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn list_completions(
        &self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError>;

    /// Insert or replace the record for `(user_id, content_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failure; a missing row is `Ok(None)`.
    async fn get_enrollment(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError>;

    /// Create the aggregate for a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the key already exists.
    async fn create_enrollment(&self, enrollment: &EnrollmentAggregate)
    -> Result<(), StorageError>;

    /// Overwrite an existing aggregate with a full recomputation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key does not exist.
    async fn update_enrollment(&self, enrollment: &EnrollmentAggregate)
    -> Result<(), StorageError>;

    /// Set `total_sections` on every enrollment of a module. Returns rows touched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update fails.
    async fn bulk_update_total_sections(
        &self,
        module_id: ModuleId,
        total_sections: u32,
    ) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the listing fails.
    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
        page: Page,
    ) -> Result<Vec<EnrollmentAggregate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the count fails.
    async fn count_enrollments(&self, filter: &EnrollmentFilter) -> Result<u64, StorageError>;
}

//
// ─── BUNDLE ────────────────────────────────────────────────────────────────────
//

/// Store handles behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub content: Arc<dyn ContentCatalog>,
    pub completions: Arc<dyn CompletionStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub transactions: Arc<dyn TransactionProvider>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one repository value for every store.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ContentCatalog + CompletionStore + EnrollmentStore + TransactionProvider + Clone + 'static,
    {
        Self {
            content: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            transactions: Arc::new(repo),
        }
    }

    /// Non-transactional session: every call goes straight to its store.
    #[must_use]
    pub fn session(&self) -> StoreSession<'_> {
        StoreSession::new(
            self.content.as_ref(),
            self.completions.as_ref(),
            self.enrollments.as_ref(),
        )
    }
}
