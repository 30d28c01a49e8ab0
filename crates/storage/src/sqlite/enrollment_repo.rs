use progress_core::model::{EnrollmentAggregate, ModuleId, UserId};
use sqlx::{Executor, Sqlite};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_enrollment_row};
use crate::repository::{EnrollmentFilter, EnrollmentStore, Page, StorageError};

const ENROLLMENT_COLUMNS: &str = "user_id, module_id, total_sections, completed_sections, \
     progress_percentage, status, enrolled_at, last_accessed_at";

pub(super) async fn select_enrollment<'c, E>(
    exec: E,
    user_id: UserId,
    module_id: ModuleId,
) -> Result<Option<EnrollmentAggregate>, StorageError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = ?1 AND module_id = ?2"
    );
    let row = sqlx::query(&sql)
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("module_id", module_id.value())?)
        .fetch_optional(exec)
        .await
        .map_err(conn)?;

    row.as_ref().map(map_enrollment_row).transpose()
}

/// Full overwrite of the mutable columns. `enrolled_at` keeps its original value.
pub(super) async fn write_enrollment<'c, E>(
    exec: E,
    enrollment: &EnrollmentAggregate,
) -> Result<(), StorageError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query(
        r"
        UPDATE enrollments SET
            total_sections = ?3,
            completed_sections = ?4,
            progress_percentage = ?5,
            status = ?6,
            last_accessed_at = ?7
        WHERE user_id = ?1 AND module_id = ?2
        ",
    )
    .bind(id_i64("user_id", enrollment.user_id().value())?)
    .bind(id_i64("module_id", enrollment.module_id().value())?)
    .bind(i64::from(enrollment.total_sections()))
    .bind(i64::from(enrollment.completed_sections()))
    .bind(i64::from(enrollment.progress_percentage()))
    .bind(enrollment.status().as_str())
    .bind(enrollment.last_accessed_at())
    .execute(exec)
    .await
    .map_err(conn)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

fn filter_clause(filter: &EnrollmentFilter) -> String {
    let mut clauses = Vec::new();
    let mut bind_index = 1;
    if filter.user_id.is_some() {
        clauses.push(format!("user_id = ?{bind_index}"));
        bind_index += 1;
    }
    if filter.module_id.is_some() {
        clauses.push(format!("module_id = ?{bind_index}"));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn filter_bind_count(filter: &EnrollmentFilter) -> usize {
    usize::from(filter.user_id.is_some()) + usize::from(filter.module_id.is_some())
}

#[async_trait::async_trait]
impl EnrollmentStore for SqliteRepository {
    async fn get_enrollment(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnrollmentAggregate>, StorageError> {
        select_enrollment(&self.pool, user_id, module_id).await
    }

    async fn create_enrollment(
        &self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO enrollments (
                user_id, module_id, total_sections, completed_sections,
                progress_percentage, status, enrolled_at, last_accessed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, module_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", enrollment.user_id().value())?)
        .bind(id_i64("module_id", enrollment.module_id().value())?)
        .bind(i64::from(enrollment.total_sections()))
        .bind(i64::from(enrollment.completed_sections()))
        .bind(i64::from(enrollment.progress_percentage()))
        .bind(enrollment.status().as_str())
        .bind(enrollment.enrolled_at())
        .bind(enrollment.last_accessed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn update_enrollment(
        &self,
        enrollment: &EnrollmentAggregate,
    ) -> Result<(), StorageError> {
        write_enrollment(&self.pool, enrollment).await
    }

    async fn bulk_update_total_sections(
        &self,
        module_id: ModuleId,
        total_sections: u32,
    ) -> Result<u64, StorageError> {
        let res = sqlx::query("UPDATE enrollments SET total_sections = ?2 WHERE module_id = ?1")
            .bind(id_i64("module_id", module_id.value())?)
            .bind(i64::from(total_sections))
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(res.rows_affected())
    }

    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
        page: Page,
    ) -> Result<Vec<EnrollmentAggregate>, StorageError> {
        let limit_index = filter_bind_count(filter) + 1;
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments{} \
             ORDER BY user_id ASC, module_id ASC LIMIT ?{} OFFSET ?{}",
            filter_clause(filter),
            limit_index,
            limit_index + 1,
        );

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(id_i64("user_id", user_id.value())?);
        }
        if let Some(module_id) = filter.module_id {
            query = query.bind(id_i64("module_id", module_id.value())?);
        }
        query = query
            .bind(i64::from(page.limit))
            .bind(id_i64("offset", page.offset)?);

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_enrollment_row(&row)?);
        }
        Ok(out)
    }

    async fn count_enrollments(&self, filter: &EnrollmentFilter) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM enrollments{}", filter_clause(filter));

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(id_i64("user_id", user_id.value())?);
        }
        if let Some(module_id) = filter.module_id {
            query = query.bind(id_i64("module_id", module_id.value())?);
        }

        let count = query.fetch_one(&self.pool).await.map_err(conn)?;
        u64::try_from(count).map_err(|_| StorageError::Serialization("negative count".into()))
    }
}
