//! hubsync - incremental GitHub issue mirror backed by SQLite.
//!
//! The library holds the store, the GitHub client and the sync engine; the
//! `hubsync` binary wraps them in a command line.

pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use error::AppError;
