use progress_core::model::{
    CompletionRecord, ContentId, ContentItem, EnrollmentAggregate, ModuleId, UserId,
};
use sqlx::{Sqlite, Transaction};

use super::SqliteRepository;
use super::completion_repo::select_completions;
use super::content_repo::select_active_content;
use super::enrollment_repo::{select_enrollment, write_enrollment};
use super::mapping::conn;
use crate::repository::StorageError;
use crate::session::{ProgressSession, ProgressTransaction, TransactionProvider};

/// A `ProgressSession` running inside one `SQLite` write transaction.
///
/// Opened with `BEGIN IMMEDIATE`, so the write lock is taken up front and two
/// concurrent read-modify-write syncs queue on `busy_timeout` instead of both
/// reading and then failing to upgrade.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTransaction {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the transaction cannot be opened.
    pub async fn begin(repo: &SqliteRepository) -> Result<Self, StorageError> {
        let tx = repo
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(conn)?;
        Ok(Self { tx })
    }
}

#[async_trait::async_trait]
impl TransactionProvider for SqliteRepository {
    async fn begin(&self) -> Result<Box<dyn ProgressTransaction>, StorageError> {
        Ok(Box::new(SqliteTransaction::begin(self).await?))
    }
}

#[async_trait::async_trait]
impl ProgressSession for SqliteTransaction {
    async fn list_active_content(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError> {
        select_active_content(&mut *self.tx, module_id).await
    }

    async fn list_completions(
        &mut self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        select_completions(&mut *self.tx, user_id, content_ids).await
    }

    async fn get_enrollment(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError> {
        select_enrollment(&mut *self.tx, user_id, module_id).await
    }

    async fn update_enrollment(
        &mut self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        write_enrollment(&mut *self.tx, enrollment).await
    }
}

#[async_trait::async_trait]
impl ProgressTransaction for SqliteTransaction {
    fn as_session(&mut self) -> &mut dyn ProgressSession {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(conn)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(conn)
    }
}
