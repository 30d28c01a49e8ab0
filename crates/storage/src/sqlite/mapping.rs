use chrono::{DateTime, Utc};
use progress_core::model::{
    CompletionRecord, CompletionStatus, ContentId, ContentItem, ContentType, EnrollmentAggregate,
    EnrollmentStatus, ModuleId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u32_from_count(v: i64) -> Result<u32, StorageError> {
    i64_to_u32("count", v)
}

pub(crate) fn map_content_row(row: &SqliteRow) -> Result<ContentItem, StorageError> {
    let raw_type: Option<String> = row.try_get("content_type").map_err(ser)?;
    let content_type = raw_type.as_deref().and_then(ContentType::parse);
    let id = ContentId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    if content_type.is_none() {
        tracing::debug!(content_id = %id, raw_type = ?raw_type, "content item has no known type");
    }

    Ok(ContentItem {
        id,
        module_id: ModuleId::new(i64_to_u64("module_id", row.try_get("module_id").map_err(ser)?)?),
        content_type,
        section: row.try_get("section").map_err(ser)?,
        duration: i64_to_u32("duration", row.try_get("duration").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        active: row.try_get::<i64, _>("active").map_err(ser)? != 0,
    })
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<CompletionRecord, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let content_id = ContentId::new(i64_to_u64(
        "content_id",
        row.try_get("content_id").map_err(ser)?,
    )?);
    // only the exact `completed` string counts as done
    let status = CompletionStatus::parse(&status_str).unwrap_or_else(|_| {
        tracing::debug!(%content_id, raw_status = %status_str, "unknown completion status");
        CompletionStatus::InProgress
    });
    let progress = i64_to_u32(
        "progress_percentage",
        row.try_get("progress_percentage").map_err(ser)?,
    )?;
    let record = CompletionRecord {
        user_id: UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        content_id,
        status,
        progress_percentage: 0,
        score: row.try_get("score").map_err(ser)?,
        max_score: row.try_get("max_score").map_err(ser)?,
    };
    record.with_progress(progress).map_err(ser)
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<EnrollmentAggregate, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let enrolled_at: DateTime<Utc> = row.try_get("enrolled_at").map_err(ser)?;

    EnrollmentAggregate::from_persisted(
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        ModuleId::new(i64_to_u64("module_id", row.try_get("module_id").map_err(ser)?)?),
        i64_to_u32("total_sections", row.try_get("total_sections").map_err(ser)?)?,
        i64_to_u32(
            "completed_sections",
            row.try_get("completed_sections").map_err(ser)?,
        )?,
        i64_to_u32(
            "progress_percentage",
            row.try_get("progress_percentage").map_err(ser)?,
        )?,
        EnrollmentStatus::parse(&status_str).map_err(ser)?,
        enrolled_at,
        row.try_get("last_accessed_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_conversion_rejects_overflow() {
        assert!(id_i64("user_id", u64::MAX).is_err());
        assert_eq!(id_i64("user_id", 5).unwrap(), 5);
        assert!(i64_to_u64("user_id", -1).is_err());
    }
}
