#![forbid(unsafe_code)]

pub mod memory;
pub mod repository;
pub mod session;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use repository::{
    CompletionStore, ContentCatalog, EnrollmentFilter, EnrollmentStore, Page, Storage,
    StorageError,
};
pub use session::{ProgressSession, ProgressTransaction, StoreSession, TransactionProvider};
