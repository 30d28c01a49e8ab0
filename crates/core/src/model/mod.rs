mod completion;
mod content_item;
mod enrollment;
mod ids;
mod snapshot;

pub use completion::{CompletionRecord, CompletionStatus};
pub use content_item::{ContentItem, ContentType};
pub use enrollment::{AppliedProgress, EnrollmentAggregate, EnrollmentKey, EnrollmentStatus};
pub use ids::{ContentId, ModuleId, ParseIdError, UserId};
pub use snapshot::{
    InvariantRepair, ItemProgress, ProgressSnapshot, TypeBreakdown, TypeProgress,
    progress_percentage,
};
