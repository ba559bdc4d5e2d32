//! Sync log: one row per sync attempt of a repository.
//!
//! Rows are written when a session starts and finalized exactly once. A row
//! with `completed_at IS NULL` is an in-progress (or abandoned) session; the
//! `ux_sync_log_in_progress` partial index allows at most one per repository.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Error text written when an operator clears a dangling session.
pub const ABANDONED_ERROR: &str = "abandoned by operator";

/// Outcome of a logged session, derived from its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: i64,
    pub repository_id: i64,
    pub operator: String,
    pub started_at: i64,
    /// Cursor the next session fetches from (Unix).
    pub watermark: i64,
    pub completed_at: Option<i64>,
    pub start_rate_limit: Option<i64>,
    pub end_rate_limit: Option<i64>,
    pub error: Option<String>,
}

impl SyncLogEntry {
    pub fn status(&self) -> LogStatus {
        match (self.completed_at, &self.error) {
            (None, _) => LogStatus::InProgress,
            (Some(_), None) => LogStatus::Completed,
            (Some(_), Some(_)) => LogStatus::Failed,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status() == LogStatus::InProgress
    }

    /// Remote requests consumed by the session, when both ends were recorded.
    pub fn requests_used(&self) -> Option<i64> {
        match (self.start_rate_limit, self.end_rate_limit) {
            (Some(start), Some(end)) => Some(start - end),
            _ => None,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, repository_id, operator, started_at, watermark, completed_at, start_rate_limit, end_rate_limit, error FROM sync_log";

/// Most recent attempt for a repository, whether or not it finished.
pub async fn latest_for_repository(
    conn: &mut SqliteConnection,
    repository_id: i64,
) -> Result<Option<SyncLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, SyncLogEntry>(&format!(
        "{} WHERE repository_id = ? ORDER BY started_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .fetch_optional(conn)
    .await
}

/// Most recent finalized attempt, successful or not. Its watermark is the
/// next session's cursor.
pub async fn latest_finished(
    conn: &mut SqliteConnection,
    repository_id: i64,
) -> Result<Option<SyncLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, SyncLogEntry>(&format!(
        "{} WHERE repository_id = ? AND completed_at IS NOT NULL
         ORDER BY started_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .fetch_optional(conn)
    .await
}

/// Most recent attempt that completed without error.
pub async fn latest_successful(
    conn: &mut SqliteConnection,
    repository_id: i64,
) -> Result<Option<SyncLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, SyncLogEntry>(&format!(
        "{} WHERE repository_id = ? AND completed_at IS NOT NULL AND error IS NULL
         ORDER BY started_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .fetch_optional(conn)
    .await
}

/// Insert an in-progress row.
///
/// Fails with a unique violation (see [`is_unique_violation`]) when another
/// in-progress row exists for the repository.
pub async fn insert(
    conn: &mut SqliteConnection,
    repository_id: i64,
    operator: &str,
    started_at: i64,
    watermark: i64,
    start_rate_limit: Option<i64>,
) -> Result<SyncLogEntry, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO sync_log (repository_id, operator, started_at, watermark, start_rate_limit)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(repository_id)
    .bind(operator)
    .bind(started_at)
    .bind(watermark)
    .bind(start_rate_limit)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(SyncLogEntry {
        id,
        repository_id,
        operator: operator.to_string(),
        started_at,
        watermark,
        completed_at: None,
        start_rate_limit,
        end_rate_limit: None,
        error: None,
    })
}

/// Finalize a row as completed. Returns false if the row was already final.
pub async fn complete(
    conn: &mut SqliteConnection,
    id: i64,
    completed_at: i64,
    end_rate_limit: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sync_log SET completed_at = ?, end_rate_limit = ?
         WHERE id = ? AND completed_at IS NULL",
    )
    .bind(completed_at)
    .bind(end_rate_limit)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Finalize a row as failed. Returns false if the row was already final.
pub async fn fail(
    conn: &mut SqliteConnection,
    id: i64,
    completed_at: i64,
    error: &str,
    end_rate_limit: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sync_log SET completed_at = ?, error = ?, end_rate_limit = ?
         WHERE id = ? AND completed_at IS NULL",
    )
    .bind(completed_at)
    .bind(error)
    .bind(end_rate_limit)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Close any dangling in-progress row for a repository as failed.
pub async fn abandon_in_progress(
    conn: &mut SqliteConnection,
    repository_id: i64,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sync_log SET completed_at = ?, error = ?
         WHERE repository_id = ? AND completed_at IS NULL",
    )
    .bind(now)
    .bind(ABANDONED_ERROR)
    .bind(repository_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Recent attempts, newest first, optionally for one repository.
pub async fn recent(
    conn: &mut SqliteConnection,
    repository_id: Option<i64>,
    limit: i64,
) -> Result<Vec<SyncLogEntry>, sqlx::Error> {
    match repository_id {
        Some(repository_id) => {
            sqlx::query_as::<_, SyncLogEntry>(&format!(
                "{} WHERE repository_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
                SELECT_COLUMNS
            ))
            .bind(repository_id)
            .bind(limit)
            .fetch_all(conn)
            .await
        }
        None => {
            sqlx::query_as::<_, SyncLogEntry>(&format!(
                "{} ORDER BY started_at DESC, id DESC LIMIT ?",
                SELECT_COLUMNS
            ))
            .bind(limit)
            .fetch_all(conn)
            .await
        }
    }
}

/// Whether a store error is a uniqueness violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::repository;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, db::pool::DbPool, i64) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let repo = repository::insert(&mut conn, Some(1), None, "acme", "widgets")
            .await
            .unwrap();
        drop(conn);
        (dir, pool, repo.id)
    }

    #[tokio::test]
    async fn test_second_in_progress_row_is_rejected() {
        let (_dir, pool, repo_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        insert(&mut conn, repo_id, "alice", 100, 0, Some(5000)).await.unwrap();
        let err = insert(&mut conn, repo_id, "bob", 200, 0, None)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_finalize_exactly_once() {
        let (_dir, pool, repo_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let entry = insert(&mut conn, repo_id, "alice", 100, 40, Some(5000)).await.unwrap();
        assert!(complete(&mut conn, entry.id, 150, Some(4990)).await.unwrap());
        assert!(!fail(&mut conn, entry.id, 160, "late", None).await.unwrap());

        let latest = latest_for_repository(&mut conn, repo_id).await.unwrap().unwrap();
        assert_eq!(latest.status(), LogStatus::Completed);
        assert_eq!(latest.requests_used(), Some(10));
        assert_eq!(latest.error, None);
    }

    #[tokio::test]
    async fn test_latest_successful_skips_failures() {
        let (_dir, pool, repo_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let ok = insert(&mut conn, repo_id, "alice", 100, 40, None).await.unwrap();
        complete(&mut conn, ok.id, 110, None).await.unwrap();
        let bad = insert(&mut conn, repo_id, "alice", 200, 140, None).await.unwrap();
        fail(&mut conn, bad.id, 210, "boom", None).await.unwrap();

        let latest = latest_for_repository(&mut conn, repo_id).await.unwrap().unwrap();
        assert_eq!(latest.status(), LogStatus::Failed);
        let good = latest_successful(&mut conn, repo_id).await.unwrap().unwrap();
        assert_eq!(good.id, ok.id);
        assert_eq!(good.watermark, 40);
    }

    #[tokio::test]
    async fn test_latest_finished_includes_failures() {
        let (_dir, pool, repo_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(latest_finished(&mut conn, repo_id).await.unwrap().is_none());
        let ok = insert(&mut conn, repo_id, "alice", 100, 40, None).await.unwrap();
        complete(&mut conn, ok.id, 110, None).await.unwrap();
        let bad = insert(&mut conn, repo_id, "alice", 200, 140, None).await.unwrap();
        fail(&mut conn, bad.id, 210, "boom", None).await.unwrap();
        insert(&mut conn, repo_id, "alice", 300, 240, None).await.unwrap();

        let finished = latest_finished(&mut conn, repo_id).await.unwrap().unwrap();
        assert_eq!(finished.id, bad.id);
        assert_eq!(finished.watermark, 140);
    }

    #[tokio::test]
    async fn test_abandon_in_progress() {
        let (_dir, pool, repo_id) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        insert(&mut conn, repo_id, "alice", 100, 40, None).await.unwrap();
        assert_eq!(abandon_in_progress(&mut conn, repo_id, 500).await.unwrap(), 1);
        assert_eq!(abandon_in_progress(&mut conn, repo_id, 600).await.unwrap(), 0);

        let latest = latest_for_repository(&mut conn, repo_id).await.unwrap().unwrap();
        assert_eq!(latest.error.as_deref(), Some(ABANDONED_ERROR));

        // A new session may start now
        insert(&mut conn, repo_id, "bob", 700, 400, None).await.unwrap();
        assert_eq!(recent(&mut conn, Some(repo_id), 10).await.unwrap().len(), 2);
    }
}
