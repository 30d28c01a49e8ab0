use progress_core::model::{EnrollmentAggregate, ModuleId, ProgressSnapshot, UserId};
use serde::Serialize;
use storage::session::ProgressSession;

use super::ProgressSyncService;
use super::engine::read_snapshot;
use crate::error::SyncError;

/// Stored aggregate side by side with a freshly computed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedEnrollment {
    pub enrollment: EnrollmentAggregate,
    pub live: ProgressSnapshot,
    /// Whether the stored counts already match the live snapshot.
    pub in_sync: bool,
}

impl EnhancedEnrollment {
    fn new(enrollment: EnrollmentAggregate, live: ProgressSnapshot) -> Self {
        let in_sync = enrollment.total_sections() == live.total_sections
            && enrollment.completed_sections() == live.completed_sections
            && enrollment.progress_percentage() == live.progress_percentage;
        Self {
            enrollment,
            live,
            in_sync,
        }
    }
}

impl ProgressSyncService {
    /// Read-only view of an enrollment with its per-type and per-item
    /// breakdown. Nothing is written, not even `last_accessed_at`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if a read fails. A missing enrollment is
    /// `Ok(None)`.
    pub async fn get_enhanced_enrollment_data(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnhancedEnrollment>, SyncError> {
        let mut session = self.storage.session();
        Self::enhanced_in(&mut session, user_id, module_id).await
    }

    async fn enhanced_in(
        session: &mut dyn ProgressSession,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<EnhancedEnrollment>, SyncError> {
        let Some(enrollment) = session.get_enrollment(user_id, module_id).await? else {
            return Ok(None);
        };

        let mut live = read_snapshot(session, user_id, module_id).await?;
        live.repair();

        Ok(Some(EnhancedEnrollment::new(enrollment, live)))
    }
}
