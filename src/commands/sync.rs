//! Sync commands.

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::repository::{self, RepositoryReference};
use crate::services::github_client::{GitHubApi, GitHubClient, GitHubClientConfig};
use crate::services::sync_engine::{SyncConfig, SyncEngine, SyncReport};
use crate::services::sync_session;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Response for the cancel command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub repository: String,
    /// Number of unfinished sessions marked as abandoned.
    pub abandoned: u64,
}

/// Sync repositories with a real GitHub client.
///
/// # Returns
/// The per-repository report; check [`SyncReport::is_success`].
pub async fn sync_repositories(
    pool: &DbPool,
    client_config: GitHubClientConfig,
    sync_config: SyncConfig,
    references: &[RepositoryReference],
    cancel: &CancellationToken,
) -> Result<SyncReport, AppError> {
    if references.is_empty() {
        return Err(AppError::invalid_input_field(
            "At least one repository is required",
            "repositories",
        ));
    }

    let client: Arc<dyn GitHubApi> = Arc::new(GitHubClient::new(client_config)?);
    let engine = SyncEngine::new(pool.clone(), client, sync_config);
    engine.sync_repositories(references, cancel).await
}

/// Mark a repository's unfinished sync as abandoned so a new one can start.
pub async fn cancel_sync(
    pool: &DbPool,
    reference: &RepositoryReference,
) -> Result<CancelResponse, AppError> {
    db::ensure_schema_current(pool).await?;

    let mut conn = pool.acquire().await?;
    let repository = repository::find_by_name(&mut conn, &reference.owner, &reference.name)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Repository", reference.to_string()))?;
    drop(conn);

    let abandoned = sync_session::abandon_in_progress(pool, &repository).await?;
    Ok(CancelResponse {
        repository: repository.full_name(),
        abandoned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sync_log;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cancel_unknown_repository() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();

        let err = cancel_sync(&pool, &RepositoryReference::new("acme", "nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cancel_clears_in_progress_row() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let repo = repository::insert(&mut conn, Some(1), None, "acme", "widgets")
            .await
            .unwrap();
        sync_log::insert(&mut conn, repo.id, "alice", 100, 0, None)
            .await
            .unwrap();
        drop(conn);

        let response = cancel_sync(&pool, &RepositoryReference::new("ACME", "Widgets"))
            .await
            .unwrap();
        assert_eq!(response.abandoned, 1);
        assert_eq!(response.repository, "acme/widgets");
    }

    #[tokio::test]
    async fn test_sync_requires_repositories() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();

        let err = sync_repositories(
            &pool,
            GitHubClientConfig::default(),
            SyncConfig::default(),
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }
}
