use progress_core::model::ModuleId;
use serde::Serialize;
use tracing::info;

use super::{BatchSummary, ProgressSyncService};
use crate::error::SyncError;

/// What changed when a module's content count was re-propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionCountUpdate {
    pub module_id: ModuleId,
    pub total_sections: u32,
    pub enrollments_updated: u64,
    /// Full resync of the module's enrollments run after the bulk update.
    pub resync: BatchSummary,
}

impl ProgressSyncService {
    /// Push the module's active content count onto every enrollment, then
    /// resync them so completed counts and percentages match the new total.
    ///
    /// Call this after content is added, removed, or deactivated.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if counting, the bulk update, or listing
    /// the module's enrollments fails.
    pub async fn update_module_section_counts(
        &self,
        module_id: ModuleId,
    ) -> Result<SectionCountUpdate, SyncError> {
        let total_sections = self.storage.content.count_active_content(module_id).await?;
        let enrollments_updated = self
            .storage
            .enrollments
            .bulk_update_total_sections(module_id, total_sections)
            .await?;
        info!(%module_id, total_sections, enrollments_updated, "section counts propagated");

        let resync = self.sync_module_enrollments(module_id).await?;

        Ok(SectionCountUpdate {
            module_id,
            total_sections,
            enrollments_updated,
            resync,
        })
    }
}
