//! Data models for the local mirror.
//!
//! These models represent the entities stored in the local SQLite database.
//! Each module pairs a `FromRow` struct with the queries that read and write
//! it; query functions take a `&mut SqliteConnection` so they can run inside
//! the reconciler's unit of work or on a pooled connection.

pub mod actor;
pub mod issue;
pub mod issue_link;
pub mod label;
pub mod milestone;
pub mod repository;
pub mod sync_log;

// Re-exports for convenient access
pub use actor::{Actor, ActorKind};
pub use issue::{ActorCollection, Issue, IssueKind, PullRequestDetails, Reactions};
pub use issue_link::IssueLink;
pub use label::Label;
pub use milestone::Milestone;
pub use repository::{Repository, RepositoryReference};
pub use sync_log::{LogStatus, SyncLogEntry};
