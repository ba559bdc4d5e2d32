//! Command handlers behind the `hubsync` binary.
//!
//! Each handler takes the store (and whatever else it needs) and returns a
//! serializable response, so the binary can print it as text or JSON:
//! - `migrate`: bring the schema up to date
//! - `sync`: sync repositories, and clear dangling sessions (`cancel`)
//! - `status`: per-repository mirror status and recent sync log entries

pub mod migrate;
pub mod status;
pub mod sync;

pub use migrate::{migrate, MigrateResponse};
pub use status::{get_status, RepositoryStatus, StatusResponse};
pub use sync::{cancel_sync, sync_repositories, CancelResponse};
