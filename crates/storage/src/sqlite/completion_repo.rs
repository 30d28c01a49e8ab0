use progress_core::model::{CompletionRecord, ContentId, UserId};
use sqlx::SqliteConnection;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_completion_row};
use crate::repository::{CompletionStore, StorageError};

/// Content ids bound per `IN (...)` query, well under SQLite's bind limit.
const IDS_PER_QUERY: usize = 500;

/// Completion records for `content_ids`, fetched in chunks of `IDS_PER_QUERY`.
pub(super) async fn select_completions(
    db: &mut SqliteConnection,
    user_id: UserId,
    content_ids: &[ContentId],
) -> Result<Vec<CompletionRecord>, StorageError> {
    let mut records = Vec::new();
    for chunk in content_ids.chunks(IDS_PER_QUERY) {
        select_chunk(&mut *db, user_id, chunk, &mut records).await?;
    }
    Ok(records)
}

async fn select_chunk(
    db: &mut SqliteConnection,
    user_id: UserId,
    content_ids: &[ContentId],
    out: &mut Vec<CompletionRecord>,
) -> Result<(), StorageError> {
    let placeholders = (0..content_ids.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r"
        SELECT user_id, content_id, status, progress_percentage, score, max_score
        FROM completions
        WHERE user_id = ?1 AND content_id IN ({placeholders})
        "
    );

    let mut query = sqlx::query(&sql).bind(id_i64("user_id", user_id.value())?);
    for id in content_ids {
        query = query.bind(id_i64("content_id", id.value())?);
    }

    let rows = query.fetch_all(db).await.map_err(conn)?;
    out.reserve(rows.len());
    for row in rows {
        out.push(map_completion_row(&row)?);
    }
    Ok(())
}

#[async_trait::async_trait]
impl CompletionStore for SqliteRepository {
    async fn list_completions(
        &self,
        user_id: UserId,
        content_ids: &[ContentId],
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        if content_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut db = self.pool.acquire().await.map_err(conn)?;
        select_completions(&mut db, user_id, content_ids).await
    }

    async fn upsert_completion(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO completions (
                user_id, content_id, status, progress_percentage, score, max_score
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, content_id) DO UPDATE SET
                status = excluded.status,
                progress_percentage = excluded.progress_percentage,
                score = excluded.score,
                max_score = excluded.max_score
            ",
        )
        .bind(id_i64("user_id", record.user_id.value())?)
        .bind(id_i64("content_id", record.content_id.value())?)
        .bind(record.status.as_str())
        .bind(i64::from(record.progress_percentage))
        .bind(record.score)
        .bind(record.max_score)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
