use serde::{Deserialize, Serialize};

use crate::model::completion::CompletionStatus;
use crate::model::content_item::ContentType;
use crate::model::ids::ContentId;

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Rounded completion percentage, half-up, `0` when there is nothing to complete.
///
/// Integer arithmetic keeps the result identical across platforms.
#[must_use]
pub fn progress_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    let rounded = (200 * completed + total) / (2 * total);
    // completed <= total bounds `rounded` to 0..=100
    u8::try_from(rounded).unwrap_or(100)
}

//
// ─── BREAKDOWN ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeProgress {
    pub completed: u32,
    pub total: u32,
}

/// Completed/total counts per content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub video: TypeProgress,
    pub lab: TypeProgress,
    pub game: TypeProgress,
    pub document: TypeProgress,
}

impl TypeBreakdown {
    #[must_use]
    pub fn get(&self, content_type: ContentType) -> TypeProgress {
        match content_type {
            ContentType::Video => self.video,
            ContentType::Lab => self.lab,
            ContentType::Game => self.game,
            ContentType::Document => self.document,
        }
    }

    pub fn get_mut(&mut self, content_type: ContentType) -> &mut TypeProgress {
        match content_type {
            ContentType::Video => &mut self.video,
            ContentType::Lab => &mut self.lab,
            ContentType::Game => &mut self.game,
            ContentType::Document => &mut self.document,
        }
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// One content item as seen by a learner at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub section: String,
    pub title: String,
    pub duration: u32,
    pub status: CompletionStatus,
    pub progress_percentage: u8,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub completed: bool,
}

/// Recomputed, never-persisted view of a learner's progress in one module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub by_type: TypeBreakdown,
    pub items: Vec<ItemProgress>,
    pub total_sections: u32,
    pub completed_sections: u32,
    pub progress_percentage: u8,
}

/// Record of a clamp applied to counts that violated `completed <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantRepair {
    pub observed_completed: u32,
    pub observed_total: u32,
    pub observed_percentage: u8,
    pub repaired_completed: u32,
    pub repaired_percentage: u8,
}

impl ProgressSnapshot {
    /// All-zero snapshot for a module without active content.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress_percentage == 100
    }

    /// Checks the count invariants and clamps them in place when violated.
    ///
    /// Returns `None` when the snapshot was already consistent.
    pub fn repair(&mut self) -> Option<InvariantRepair> {
        let expected = progress_percentage(self.completed_sections, self.total_sections);
        if self.completed_sections <= self.total_sections && self.progress_percentage == expected {
            return None;
        }

        let observed_completed = self.completed_sections;
        let observed_percentage = self.progress_percentage;
        self.completed_sections = self.completed_sections.min(self.total_sections);
        self.progress_percentage = progress_percentage(self.completed_sections, self.total_sections);

        Some(InvariantRepair {
            observed_completed,
            observed_total: self.total_sections,
            observed_percentage,
            repaired_completed: self.completed_sections,
            repaired_percentage: self.progress_percentage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(progress_percentage(3, 4), 75);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(1, 8), 13);
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(5, 5), 100);
    }

    #[test]
    fn percentage_never_exceeds_hundred() {
        assert_eq!(progress_percentage(9, 4), 100);
    }

    #[test]
    fn repair_clamps_completed_to_total() {
        let mut snapshot = ProgressSnapshot {
            total_sections: 4,
            completed_sections: 6,
            progress_percentage: 150,
            ..ProgressSnapshot::default()
        };

        let repair = snapshot.repair().expect("violation detected");

        assert_eq!(repair.observed_completed, 6);
        assert_eq!(repair.repaired_completed, 4);
        assert_eq!(snapshot.completed_sections, 4);
        assert_eq!(snapshot.progress_percentage, 100);
    }

    #[test]
    fn repair_leaves_consistent_snapshot_alone() {
        let mut snapshot = ProgressSnapshot {
            total_sections: 4,
            completed_sections: 3,
            progress_percentage: 75,
            ..ProgressSnapshot::default()
        };
        assert!(snapshot.repair().is_none());
        assert_eq!(snapshot.progress_percentage, 75);
    }

    #[test]
    fn repair_with_zero_total_lands_on_zero_percent() {
        let mut snapshot = ProgressSnapshot {
            total_sections: 0,
            completed_sections: 2,
            progress_percentage: 100,
            ..ProgressSnapshot::default()
        };
        snapshot.repair().expect("violation detected");
        assert_eq!(snapshot.completed_sections, 0);
        assert_eq!(snapshot.progress_percentage, 0);
    }
}
