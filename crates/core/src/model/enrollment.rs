use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::ids::{ModuleId, UserId};
use crate::model::snapshot::ProgressSnapshot;

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Completed,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::InvalidEnrollmentStatus` for unknown strings.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(ModelError::InvalidEnrollmentStatus(other.to_owned())),
        }
    }
}

//
// ─── KEY ───────────────────────────────────────────────────────────────────────
//

/// The unit of mutation: one aggregate per (user, module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrollmentKey {
    pub user_id: UserId,
    pub module_id: ModuleId,
}

impl EnrollmentKey {
    #[must_use]
    pub fn new(user_id: UserId, module_id: ModuleId) -> Self {
        Self { user_id, module_id }
    }
}

impl std::fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} / module {}", self.user_id, self.module_id)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Coarse per-enrollment progress projection.
///
/// Counts are only ever overwritten from a freshly computed snapshot; the
/// status only moves from `Active` to `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentAggregate {
    key: EnrollmentKey,
    total_sections: u32,
    completed_sections: u32,
    progress_percentage: u8,
    status: EnrollmentStatus,
    enrolled_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
}

/// What `apply_snapshot` changed, used for logging and batch counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppliedProgress {
    pub counts_changed: bool,
    pub newly_completed: bool,
}

impl EnrollmentAggregate {
    /// Fresh, empty enrollment as created by the enrollment flow.
    #[must_use]
    pub fn new(user_id: UserId, module_id: ModuleId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            key: EnrollmentKey::new(user_id, module_id),
            total_sections: 0,
            completed_sections: 0,
            progress_percentage: 0,
            status: EnrollmentStatus::Active,
            enrolled_at,
            last_accessed_at: None,
        }
    }

    /// Rehydrate a stored aggregate.
    ///
    /// `completed_sections > total_sections` is accepted here; the next sync repairs it.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidPercentage` if the stored percentage exceeds 100.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        module_id: ModuleId,
        total_sections: u32,
        completed_sections: u32,
        progress_percentage: u32,
        status: EnrollmentStatus,
        enrolled_at: DateTime<Utc>,
        last_accessed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ModelError> {
        let pct = u8::try_from(progress_percentage)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(ModelError::InvalidPercentage(progress_percentage))?;
        Ok(Self {
            key: EnrollmentKey::new(user_id, module_id),
            total_sections,
            completed_sections,
            progress_percentage: pct,
            status,
            enrolled_at,
            last_accessed_at,
        })
    }

    #[must_use]
    pub fn key(&self) -> EnrollmentKey {
        self.key
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.key.user_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.key.module_id
    }

    #[must_use]
    pub fn total_sections(&self) -> u32 {
        self.total_sections
    }

    #[must_use]
    pub fn completed_sections(&self) -> u32 {
        self.completed_sections
    }

    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    #[must_use]
    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }

    /// Overwrite the section total without touching the other counters.
    ///
    /// Used by section-count propagation ahead of a full resync.
    pub fn set_total_sections(&mut self, total: u32) {
        self.total_sections = total;
    }

    /// Copy the snapshot's counts onto the aggregate, promote to `Completed`
    /// at 100%, and stamp `last_accessed_at`.
    ///
    /// The snapshot is expected to be repaired already.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> AppliedProgress {
        let counts_changed = self.total_sections != snapshot.total_sections
            || self.completed_sections != snapshot.completed_sections
            || self.progress_percentage != snapshot.progress_percentage;

        self.total_sections = snapshot.total_sections;
        self.completed_sections = snapshot.completed_sections;
        self.progress_percentage = snapshot.progress_percentage;

        let newly_completed =
            self.status == EnrollmentStatus::Active && snapshot.progress_percentage == 100;
        if newly_completed {
            self.status = EnrollmentStatus::Completed;
        }

        self.last_accessed_at = Some(now);

        AppliedProgress {
            counts_changed,
            newly_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn snapshot(completed: u32, total: u32) -> ProgressSnapshot {
        ProgressSnapshot {
            total_sections: total,
            completed_sections: completed,
            progress_percentage: crate::model::snapshot::progress_percentage(completed, total),
            ..ProgressSnapshot::default()
        }
    }

    #[test]
    fn reaching_hundred_completes_enrollment() {
        let mut enrollment = EnrollmentAggregate::new(UserId::new(1), ModuleId::new(1), fixed_now());

        let applied = enrollment.apply_snapshot(&snapshot(4, 4), fixed_now());

        assert!(applied.newly_completed);
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
        assert_eq!(enrollment.last_accessed_at(), Some(fixed_now()));
    }

    #[test]
    fn completed_enrollment_is_never_demoted() {
        let mut enrollment = EnrollmentAggregate::new(UserId::new(1), ModuleId::new(1), fixed_now());
        enrollment.apply_snapshot(&snapshot(2, 2), fixed_now());

        // catalog grew, learner is back under 100%
        let applied = enrollment.apply_snapshot(&snapshot(2, 3), fixed_now());

        assert!(!applied.newly_completed);
        assert!(applied.counts_changed);
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
        assert_eq!(enrollment.progress_percentage(), 67);
    }

    #[test]
    fn repeated_apply_is_idempotent() {
        let mut enrollment = EnrollmentAggregate::new(UserId::new(1), ModuleId::new(1), fixed_now());
        enrollment.apply_snapshot(&snapshot(1, 2), fixed_now());
        let first = enrollment.clone();

        let applied = enrollment.apply_snapshot(&snapshot(1, 2), fixed_now());

        assert!(!applied.counts_changed);
        assert_eq!(enrollment, first);
    }

    #[test]
    fn from_persisted_rejects_percentage_over_hundred() {
        let err = EnrollmentAggregate::from_persisted(
            UserId::new(1),
            ModuleId::new(1),
            2,
            1,
            120,
            EnrollmentStatus::Active,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ModelError::InvalidPercentage(120));
    }
}
