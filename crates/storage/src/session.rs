//! Session abstraction shared by the plain and transactional sync paths.
//!
//! A `ProgressSession` is everything one enrollment sync touches: the module's
//! active content, the learner's completion records, and the enrollment
//! aggregate itself. `StoreSession` forwards each call to the individual
//! stores. A `ProgressTransaction` runs the same calls against one
//! storage transaction so the reads and the final write see one snapshot.

use async_trait::async_trait;
use progress_core::model::{
    CompletionRecord, ContentId, ContentItem, EnrollmentAggregate, ModuleId, UserId,
};

use crate::repository::{CompletionStore, ContentCatalog, EnrollmentStore, StorageError};

#[async_trait]
pub trait ProgressSession: Send {
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_active_content(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn list_completions(
        &mut self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failure; a missing row is `Ok(None)`.
    async fn get_enrollment(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the aggregate vanished, or other storage errors.
    async fn update_enrollment(
        &mut self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError>;
}

/// A session bound to one storage transaction.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait ProgressTransaction: ProgressSession {
    fn as_session(&mut self) -> &mut dyn ProgressSession;

    /// # Errors
    ///
    /// Returns `StorageError` if the commit fails; nothing is applied in that case.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend reports a rollback failure.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// Open a transaction that serializes against other writers of the same store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction cannot be started.
    async fn begin(&self) -> Result<Box<dyn ProgressTransaction>, StorageError>;
}

//
// ─── PLAIN SESSION ─────────────────────────────────────────────────────────────
//

/// Autocommit session over borrowed store handles.
pub struct StoreSession<'a> {
    content: &'a dyn ContentCatalog,
    completions: &'a dyn CompletionStore,
    enrollments: &'a dyn EnrollmentStore,
}

impl<'a> StoreSession<'a> {
    #[must_use]
    pub fn new(
        content: &'a dyn ContentCatalog,
        completions: &'a dyn CompletionStore,
        enrollments: &'a dyn EnrollmentStore,
    ) -> Self {
        Self {
            content,
            completions,
            enrollments,
        }
    }
}

#[async_trait]
impl ProgressSession for StoreSession<'_> {
    async fn list_active_content(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError> {
        self.content.list_active_content(module_id).await
    }

    async fn list_completions(
        &mut self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        self.completions.list_completions(user_id, content_ids).await
    }

    async fn get_enrollment(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError> {
        self.enrollments.get_enrollment(user_id, module_id).await
    }

    async fn update_enrollment(
        &mut self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        self.enrollments.update_enrollment(enrollment).await
    }
}
