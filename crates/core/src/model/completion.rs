use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::ids::{ContentId, UserId};

/// Lifecycle of a learner's work on one content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl CompletionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "not-started",
            CompletionStatus::InProgress => "in-progress",
            CompletionStatus::Completed => "completed",
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::InvalidCompletionStatus` for unknown strings.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw {
            "not-started" => Ok(Self::NotStarted),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ModelError::InvalidCompletionStatus(other.to_owned())),
        }
    }
}

/// Per-user, per-content progress entry written by the progress-reporting side.
///
/// Only `status` decides completion. `progress_percentage` and the scores are
/// carried through to item details for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub user_id: UserId,
    pub content_id: ContentId,
    pub status: CompletionStatus,
    pub progress_percentage: u8,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
}

impl CompletionRecord {
    #[must_use]
    pub fn new(user_id: UserId, content_id: ContentId, status: CompletionStatus) -> Self {
        let progress_percentage = if status == CompletionStatus::Completed {
            100
        } else {
            0
        };
        Self {
            user_id,
            content_id,
            status,
            progress_percentage,
            score: None,
            max_score: None,
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::InvalidPercentage` if `percentage > 100`.
    pub fn with_progress(mut self, percentage: u32) -> Result<Self, ModelError> {
        let pct = u8::try_from(percentage).ok().filter(|p| *p <= 100);
        self.progress_percentage = pct.ok_or(ModelError::InvalidPercentage(percentage))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_score(mut self, score: f64, max_score: f64) -> Self {
        self.score = Some(score);
        self.max_score = Some(max_score);
        self
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == CompletionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_and_reject_unknown() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::Completed,
        ] {
            assert_eq!(CompletionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(matches!(
            CompletionStatus::parse("done"),
            Err(ModelError::InvalidCompletionStatus(_))
        ));
    }

    #[test]
    fn full_percentage_without_completed_status_is_not_completed() {
        let record = CompletionRecord::new(UserId::new(1), ContentId::new(1), CompletionStatus::InProgress)
            .with_progress(100)
            .unwrap();
        assert!(!record.is_completed());
    }

    #[test]
    fn percentage_above_hundred_is_rejected() {
        let err = CompletionRecord::new(UserId::new(1), ContentId::new(1), CompletionStatus::InProgress)
            .with_progress(101)
            .unwrap_err();
        assert_eq!(err, ModelError::InvalidPercentage(101));
    }
}
