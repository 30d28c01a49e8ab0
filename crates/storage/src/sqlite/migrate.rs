use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the content catalog, completion records, enrollment aggregates and
/// their indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS content_items (
                    id INTEGER PRIMARY KEY,
                    module_id INTEGER NOT NULL,
                    content_type TEXT,
                    section TEXT NOT NULL DEFAULT '',
                    duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0),
                    title TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS completions (
                    user_id INTEGER NOT NULL,
                    content_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    progress_percentage INTEGER NOT NULL
                        CHECK (progress_percentage BETWEEN 0 AND 100),
                    score REAL,
                    max_score REAL,
                    PRIMARY KEY (user_id, content_id),
                    FOREIGN KEY (content_id) REFERENCES content_items(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS enrollments (
                    user_id INTEGER NOT NULL,
                    module_id INTEGER NOT NULL,
                    total_sections INTEGER NOT NULL CHECK (total_sections >= 0),
                    completed_sections INTEGER NOT NULL CHECK (completed_sections >= 0),
                    progress_percentage INTEGER NOT NULL
                        CHECK (progress_percentage BETWEEN 0 AND 100),
                    status TEXT NOT NULL,
                    enrolled_at TEXT NOT NULL,
                    last_accessed_at TEXT,
                    PRIMARY KEY (user_id, module_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_content_items_module_active
                    ON content_items(module_id, active, section, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_enrollments_module
                    ON enrollments(module_id, user_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
