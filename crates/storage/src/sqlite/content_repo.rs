use progress_core::model::{ContentItem, ModuleId};
use sqlx::{Executor, Sqlite};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_content_row, u32_from_count};
use crate::repository::{ContentCatalog, StorageError};

pub(super) async fn select_active_content<'c, E>(
    exec: E,
    module_id: ModuleId,
) -> Result<Vec<ContentItem>, StorageError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query(
        r"
        SELECT id, module_id, content_type, section, duration, title, active
        FROM content_items
        WHERE module_id = ?1 AND active = 1
        ORDER BY section ASC, id ASC
        ",
    )
    .bind(id_i64("module_id", module_id.value())?)
    .fetch_all(exec)
    .await
    .map_err(conn)?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(map_content_row(&row)?);
    }
    Ok(items)
}

#[async_trait::async_trait]
impl ContentCatalog for SqliteRepository {
    async fn list_active_content(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentItem>, StorageError> {
        select_active_content(&self.pool, module_id).await
    }

    async fn count_active_content(&self, module_id: ModuleId) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM content_items
            WHERE module_id = ?1 AND active = 1
            ",
        )
        .bind(id_i64("module_id", module_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_count(count)
    }

    async fn upsert_content(&self, item: &ContentItem) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO content_items (id, module_id, content_type, section, duration, title, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                module_id = excluded.module_id,
                content_type = excluded.content_type,
                section = excluded.section,
                duration = excluded.duration,
                title = excluded.title,
                active = excluded.active
            ",
        )
        .bind(id_i64("content_id", item.id.value())?)
        .bind(id_i64("module_id", item.module_id.value())?)
        .bind(item.content_type.map(|t| t.as_str()))
        .bind(item.section.as_str())
        .bind(i64::from(item.duration))
        .bind(item.title.as_str())
        .bind(i64::from(item.active))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
