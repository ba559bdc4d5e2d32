//! Mirror status command.

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::issue;
use crate::models::issue_link;
use crate::models::repository::{self, RepositoryReference};
use crate::models::sync_log::{self, SyncLogEntry};
use serde::Serialize;

/// Status of one mirrored repository.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    pub repository: String,
    /// Referenced from an issue body but never readable remotely.
    pub is_stub: bool,
    pub issue_count: i64,
    pub last_attempt: Option<SyncLogEntry>,
    pub last_success: Option<SyncLogEntry>,
}

/// Response for the status command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub repositories: Vec<RepositoryStatus>,
    /// Links whose target issue is not mirrored yet.
    pub pending_links: i64,
    pub recent_logs: Vec<SyncLogEntry>,
}

/// Report the mirror state, optionally for a single repository.
pub async fn get_status(
    pool: &DbPool,
    reference: Option<&RepositoryReference>,
    log_limit: i64,
) -> Result<StatusResponse, AppError> {
    db::ensure_schema_current(pool).await?;
    let mut conn = pool.acquire().await?;

    let repositories = match reference {
        Some(reference) => {
            let repository =
                repository::find_by_name(&mut conn, &reference.owner, &reference.name)
                    .await?
                    .ok_or_else(|| AppError::not_found_with_id("Repository", reference.to_string()))?;
            vec![repository]
        }
        None => repository::list(pool).await?,
    };

    let mut statuses = Vec::with_capacity(repositories.len());
    for repository in &repositories {
        statuses.push(RepositoryStatus {
            repository: repository.full_name(),
            is_stub: repository.is_stub(),
            issue_count: issue::count_for_repository(&mut conn, repository.id).await?,
            last_attempt: sync_log::latest_for_repository(&mut conn, repository.id).await?,
            last_success: sync_log::latest_successful(&mut conn, repository.id).await?,
        });
    }

    let scope = match reference {
        Some(_) => repositories.first().map(|r| r.id),
        None => None,
    };

    Ok(StatusResponse {
        repositories: statuses,
        pending_links: issue_link::count_pending(&mut conn).await?,
        recent_logs: sync_log::recent(&mut conn, scope, log_limit).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_status_of_empty_mirror() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();

        let status = get_status(&pool, None, 10).await.unwrap();
        assert!(status.repositories.is_empty());
        assert_eq!(status.pending_links, 0);
        assert!(status.recent_logs.is_empty());
    }

    #[tokio::test]
    async fn test_status_requires_current_schema() {
        let dir = tempdir().unwrap();
        let pool = db::open(&dir.path().join("test.db")).await.unwrap();

        let err = get_status(&pool, None, 10).await.unwrap_err();
        assert!(matches!(err, AppError::SchemaNotReady { .. }));
    }

    #[tokio::test]
    async fn test_status_reports_stub_and_last_sync() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let repo = repository::insert(&mut conn, Some(1), None, "acme", "widgets")
            .await
            .unwrap();
        repository::insert(&mut conn, None, None, "ghost", "gone")
            .await
            .unwrap();
        let entry = sync_log::insert(&mut conn, repo.id, "alice", 100, 0, Some(5000))
            .await
            .unwrap();
        sync_log::complete(&mut conn, entry.id, 120, Some(4990))
            .await
            .unwrap();
        drop(conn);

        let status = get_status(&pool, None, 10).await.unwrap();
        assert_eq!(status.repositories.len(), 2);
        let widgets = &status.repositories[0];
        assert_eq!(widgets.repository, "acme/widgets");
        assert!(!widgets.is_stub);
        assert_eq!(widgets.last_success.as_ref().map(|e| e.id), Some(entry.id));
        assert!(status.repositories[1].is_stub);

        let one = get_status(&pool, Some(&RepositoryReference::new("acme", "widgets")), 10)
            .await
            .unwrap();
        assert_eq!(one.repositories.len(), 1);
        assert_eq!(one.recent_logs.len(), 1);
    }
}
