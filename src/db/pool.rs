//! SQLite pool for the mirror.
//!
//! The database runs in WAL mode so status queries and the read side of
//! concurrent repository syncs never wait on the writer. Writes are
//! serialized in-process by the unit of work's write gate; the busy timeout
//! only covers other processes holding the file.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

/// Upper bound on pooled connections regardless of requested concurrency.
const MAX_POOL_CONNECTIONS: u32 = 32;

/// Sizing and timeouts for [`create_pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolSettings {
    /// Settings for `concurrency` repositories syncing at once.
    ///
    /// Each in-flight repository reads through its own connection while one
    /// of them holds the write transaction, plus one spare for the sync log.
    pub fn for_concurrency(concurrency: usize) -> Self {
        let wanted = u32::try_from(concurrency.max(1))
            .unwrap_or(MAX_POOL_CONNECTIONS)
            .saturating_add(2);
        let defaults = Self::default();
        Self {
            max_connections: wanted
                .max(defaults.max_connections)
                .min(MAX_POOL_CONNECTIONS),
            // Waiters may queue behind every other repository's page
            acquire_timeout: defaults.acquire_timeout * concurrency.clamp(1, 6) as u32,
            ..defaults
        }
    }
}

/// Open a WAL pool on `db_path` with foreign keys enforced.
pub async fn create_pool(db_path: &Path, settings: &PoolSettings) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(settings.busy_timeout)
        .pragma("wal_autocheckpoint", "1000");

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(1)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    log::debug!(
        "Opened {} with up to {} connections",
        db_path.display(),
        settings.max_connections
    );
    Ok(pool)
}
