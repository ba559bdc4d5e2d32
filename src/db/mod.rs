//! Database layer for the local SQLite mirror.
//!
//! This module handles:
//! - Connection pool management with WAL mode
//! - Embedded schema migrations and the schema-current precondition
//! - The reconciler's unit of work

pub mod pool;
pub mod unit_of_work;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Schema is not current, pending migrations: {0:?}")]
    SchemaNotReady(Vec<String>),
}

/// Ordered list of embedded migrations.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial_schema",
    include_str!("migrations/0001_initial_schema.sql"),
)];

/// Default database file name, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "hubsync.db";

/// Resolve the database path, falling back to [`DEFAULT_DB_FILE`].
pub fn get_db_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

/// Initialize the database: create the file if needed and run migrations.
///
/// # Arguments
/// * `db_path` - Path to the SQLite database file
///
/// # Returns
/// A connection pool configured with WAL mode
pub async fn initialize(db_path: &Path) -> Result<pool::DbPool, DbError> {
    let pool = open(db_path).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Open the database without touching its schema.
///
/// Syncing uses this so that a stale schema is reported instead of silently
/// migrated; see [`ensure_schema_current`].
pub async fn open(db_path: &Path) -> Result<pool::DbPool, DbError> {
    open_with(db_path, &pool::PoolSettings::default()).await
}

/// [`open`] with explicit pool sizing, used when syncing several
/// repositories at once.
pub async fn open_with(
    db_path: &Path,
    settings: &pool::PoolSettings,
) -> Result<pool::DbPool, DbError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Migration(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    Ok(pool::create_pool(db_path, settings).await?)
}

async fn ensure_migrations_table(pool: &pool::DbPool) -> Result<(), DbError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Names of embedded migrations that have not been applied yet, in order.
pub async fn pending_migrations(pool: &pool::DbPool) -> Result<Vec<String>, DbError> {
    ensure_migrations_table(pool).await?;

    let applied: Vec<(String,)> = sqlx::query_as("SELECT name FROM _migrations")
        .fetch_all(pool)
        .await?;

    Ok(MIGRATIONS
        .iter()
        .filter(|(name, _)| !applied.iter().any(|(a,)| a == name))
        .map(|(name, _)| name.to_string())
        .collect())
}

/// Fail with [`DbError::SchemaNotReady`] when migrations are pending.
pub async fn ensure_schema_current(pool: &pool::DbPool) -> Result<(), DbError> {
    let pending = pending_migrations(pool).await?;
    if pending.is_empty() {
        log::debug!("No pending migrations found");
        Ok(())
    } else {
        for name in &pending {
            log::error!("Pending migration: {}", name);
        }
        Err(DbError::SchemaNotReady(pending))
    }
}

/// Run all pending database migrations, returning the names applied.
pub async fn run_migrations(pool: &pool::DbPool) -> Result<Vec<String>, DbError> {
    let pending = pending_migrations(pool).await?;

    for name in &pending {
        let Some((_, sql)) = MIGRATIONS.iter().find(|(n, _)| n == name) else {
            return Err(DbError::Migration(format!("Unknown migration {}", name)));
        };

        log::info!("Applying migration {}", name);
        let mut tx = pool.begin().await?;
        for statement in parse_sql_statements(sql) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(pending)
}

/// Parse SQL statements from a migration file.
///
/// This handles:
/// - Comments (lines starting with --)
/// - Semicolons inside parentheses (e.g., `strftime('%s', 'now')`)
/// - Multi-line statements
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current_statement = String::new();
    let mut paren_depth: i32 = 0;

    for line in sql.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("--") {
            continue;
        }

        let line_without_comment = if let Some(idx) = line.find("--") {
            &line[..idx]
        } else {
            line
        };

        for ch in line_without_comment.chars() {
            match ch {
                '(' => {
                    paren_depth += 1;
                    current_statement.push(ch);
                }
                ')' => {
                    paren_depth = paren_depth.saturating_sub(1);
                    current_statement.push(ch);
                }
                ';' if paren_depth == 0 => {
                    let stmt = current_statement.trim().to_string();
                    if !stmt.is_empty() {
                        statements.push(stmt);
                    }
                    current_statement.clear();
                }
                _ => {
                    current_statement.push(ch);
                }
            }
        }

        if !current_statement.is_empty() {
            current_statement.push(' ');
        }
    }

    let final_stmt = current_statement.trim().to_string();
    if !final_stmt.is_empty() {
        statements.push(final_stmt);
    }

    statements
}
