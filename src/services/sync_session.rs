//! One repository's sync attempt, from the sync log's point of view.
//!
//! Starting a session reads the log to refuse overlapping runs and to pick
//! the fetch-since cursor, then writes an in-progress row. The session ends
//! through [`SyncSession::complete`] or [`SyncSession::fail`], both of which
//! consume it, so a row is finalized exactly once.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::repository::Repository;
use crate::models::sync_log::{self, SyncLogEntry};
use sqlx::SqliteConnection;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default distance between a session's start and the watermark it records.
pub const DEFAULT_WATERMARK_MARGIN_SECS: i64 = 300;

/// Get the current Unix timestamp.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn in_progress_error(repository: &Repository, entry: &SyncLogEntry) -> AppError {
    AppError::SyncInProgress {
        repository: repository.full_name(),
        operator: entry.operator.clone(),
        started_at: entry.started_at,
    }
}

/// Fail with [`AppError::SyncInProgress`] if the repository's most recent
/// log row is unfinished. Reads the store only.
pub async fn ensure_idle(
    conn: &mut SqliteConnection,
    repository: &Repository,
) -> Result<(), AppError> {
    match sync_log::latest_for_repository(conn, repository.id).await? {
        Some(latest) if latest.is_in_progress() => Err(in_progress_error(repository, &latest)),
        _ => Ok(()),
    }
}

/// Finalize any dangling in-progress row for the repository as abandoned.
pub async fn abandon_in_progress(pool: &DbPool, repository: &Repository) -> Result<u64, AppError> {
    let mut conn = pool.acquire().await?;
    let abandoned = sync_log::abandon_in_progress(&mut conn, repository.id, now()).await?;
    if abandoned > 0 {
        log::warn!(
            "Marked {} unfinished sync(s) of {} as abandoned",
            abandoned,
            repository.full_name()
        );
    }
    Ok(abandoned)
}

/// An in-progress sync of one repository.
#[derive(Debug)]
pub struct SyncSession {
    pool: DbPool,
    repository: Repository,
    entry: SyncLogEntry,
    since: Option<i64>,
}

impl SyncSession {
    /// Open a session.
    ///
    /// * `started_at` - session start (Unix)
    /// * `margin_secs` - how far before `started_at` the new watermark lies
    pub async fn start(
        pool: &DbPool,
        repository: &Repository,
        operator: &str,
        start_rate_limit: Option<i64>,
        started_at: i64,
        margin_secs: i64,
    ) -> Result<Self, AppError> {
        let mut conn = pool.acquire().await?;

        ensure_idle(&mut conn, repository).await?;

        let since = sync_log::latest_finished(&mut conn, repository.id)
            .await?
            .map(|previous| previous.watermark);
        let watermark = started_at - margin_secs;

        let entry = match sync_log::insert(
            &mut conn,
            repository.id,
            operator,
            started_at,
            watermark,
            start_rate_limit,
        )
        .await
        {
            Ok(entry) => entry,
            Err(e) if sync_log::is_unique_violation(&e) => {
                // Another process started between our check and insert
                return match sync_log::latest_for_repository(&mut conn, repository.id).await? {
                    Some(racer) => Err(in_progress_error(repository, &racer)),
                    None => Err(AppError::database_with_op(e.to_string(), "start sync session")),
                };
            }
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "Sync of {} started by {} (since: {}, watermark: {})",
            repository.full_name(),
            operator,
            since.map(|s| s.to_string()).unwrap_or_else(|| "beginning".to_string()),
            watermark
        );

        Ok(Self {
            pool: pool.clone(),
            repository: repository.clone(),
            entry,
            since,
        })
    }

    /// Cursor for the issue listing; `None` on the first sync.
    pub fn since(&self) -> Option<i64> {
        self.since
    }

    /// Watermark this session records for the next one.
    pub fn watermark(&self) -> i64 {
        self.entry.watermark
    }

    pub fn entry(&self) -> &SyncLogEntry {
        &self.entry
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Mark the session completed.
    pub async fn complete(mut self, end_rate_limit: Option<i64>) -> Result<SyncLogEntry, AppError> {
        let completed_at = now();
        let mut conn = self.pool.acquire().await?;
        if !sync_log::complete(&mut conn, self.entry.id, completed_at, end_rate_limit).await? {
            log::warn!(
                "Sync log row {} of {} was finalized by someone else",
                self.entry.id,
                self.repository.full_name()
            );
        }

        self.entry.completed_at = Some(completed_at);
        self.entry.end_rate_limit = end_rate_limit;
        log::info!(
            "Sync of {} completed in {}s",
            self.repository.full_name(),
            completed_at - self.entry.started_at
        );
        Ok(self.entry)
    }

    /// Mark the session failed, recording the error text.
    pub async fn fail(
        mut self,
        error: &AppError,
        end_rate_limit: Option<i64>,
    ) -> Result<SyncLogEntry, AppError> {
        let completed_at = now();
        let message = error.to_string();
        let mut conn = self.pool.acquire().await?;
        if !sync_log::fail(&mut conn, self.entry.id, completed_at, &message, end_rate_limit).await? {
            log::warn!(
                "Sync log row {} of {} was finalized by someone else",
                self.entry.id,
                self.repository.full_name()
            );
        }

        self.entry.completed_at = Some(completed_at);
        self.entry.end_rate_limit = end_rate_limit;
        self.entry.error = Some(message);
        log::error!("Sync of {} failed: {}", self.repository.full_name(), error);
        Ok(self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::repository;
    use crate::models::sync_log::LogStatus;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, DbPool, Repository) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let repo = repository::insert(&mut conn, Some(1), None, "acme", "widgets")
            .await
            .unwrap();
        drop(conn);
        (dir, pool, repo)
    }

    #[tokio::test]
    async fn test_first_session_fetches_everything() {
        let (_dir, pool, repo) = setup().await;

        let session = SyncSession::start(&pool, &repo, "alice", Some(5000), 10_000, 300)
            .await
            .unwrap();
        assert_eq!(session.since(), None);
        assert_eq!(session.watermark(), 9_700);
        assert!(session.entry().is_in_progress());

        let entry = session.complete(Some(4900)).await.unwrap();
        assert_eq!(entry.status(), LogStatus::Completed);
        assert_eq!(entry.requests_used(), Some(100));
    }

    #[tokio::test]
    async fn test_cursor_is_previous_watermark() {
        let (_dir, pool, repo) = setup().await;

        let first = SyncSession::start(&pool, &repo, "alice", None, 10_000, 300)
            .await
            .unwrap();
        first.complete(None).await.unwrap();

        let second = SyncSession::start(&pool, &repo, "alice", None, 50_000, 300)
            .await
            .unwrap();
        assert_eq!(second.since(), Some(9_700));
        assert_eq!(second.watermark(), 49_700);
    }

    #[tokio::test]
    async fn test_unfinished_session_blocks_start() {
        let (_dir, pool, repo) = setup().await;

        let _running = SyncSession::start(&pool, &repo, "alice", None, 10_000, 300)
            .await
            .unwrap();
        let err = SyncSession::start(&pool, &repo, "bob", None, 10_060, 300)
            .await
            .unwrap_err();
        match err {
            AppError::SyncInProgress { operator, started_at, .. } => {
                assert_eq!(operator, "alice");
                assert_eq!(started_at, 10_000);
            }
            other => panic!("expected SyncInProgress, got {:?}", other),
        }

        assert_eq!(abandon_in_progress(&pool, &repo).await.unwrap(), 1);
        SyncSession::start(&pool, &repo, "bob", None, 10_120, 300)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_session_sets_cursor() {
        let (_dir, pool, repo) = setup().await;

        let ok = SyncSession::start(&pool, &repo, "alice", None, 10_000, 300)
            .await
            .unwrap();
        ok.complete(None).await.unwrap();

        let failing = SyncSession::start(&pool, &repo, "alice", None, 20_000, 300)
            .await
            .unwrap();
        let entry = failing
            .fail(&AppError::fetch("Bad gateway", 502, "/repos/acme/widgets/issues"), None)
            .await
            .unwrap();
        assert_eq!(entry.status(), LogStatus::Failed);
        assert!(entry.error.unwrap().contains("502"));

        let next = SyncSession::start(&pool, &repo, "alice", None, 30_000, 300)
            .await
            .unwrap();
        assert_eq!(next.since(), Some(19_700));
    }
}
