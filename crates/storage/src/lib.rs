#![forbid(unsafe_code)]

pub mod mirror;
pub mod repository;
pub mod sqlite;

pub use mirror::MirroredEntitlementStore;
pub use repository::{
    EntitlementRecord, EntitlementStore, GrantRecord, InMemoryStore, ProgressStore,
    QuestionRepository, Storage, StorageError, SummaryRepository,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
