#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod sync;

pub use progress_core::Clock;

pub use config::SyncConfig;
pub use error::{AppServicesError, SyncError};
pub use sync::{
    BatchSummary, BulkOptions, EnhancedEnrollment, ProgressSyncService, SectionCountUpdate,
    SyncFailure, SyncMode, SyncOutcome,
};
