//! Sync services.
//!
//! This module contains the remote client, the pager, the link scanner, the
//! reconciler and the session/engine layers that tie them to the store.
//!
//! Services depend on [`github_client::GitHubApi`] rather than on the HTTP
//! client directly, so they can be exercised against an in-memory remote.

pub mod github_client;
pub mod link_scanner;
pub mod pager;
pub mod reconciler;
pub mod sync_engine;
pub mod sync_session;

pub use github_client::{GitHubApi, GitHubClient, GitHubClientConfig};
pub use pager::{Pager, RepoResource};
pub use reconciler::Reconciler;
pub use sync_engine::{SyncConfig, SyncEngine, SyncReport, SyncResult};
pub use sync_session::SyncSession;
