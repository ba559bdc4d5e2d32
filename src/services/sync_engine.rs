//! Sync engine: drives sessions end to end.
//!
//! For each repository:
//! - refuse to start while an earlier sync is unfinished (local check, no
//!   remote call)
//! - reconcile the repository snapshot and open a session
//! - stream labels, milestones, then issues updated since the session's
//!   cursor, flushing the unit of work after every page
//! - close the session as completed, or as failed after flushing whatever
//!   was reconciled before the error
//!
//! Several repositories may be synced concurrently; each gets its own
//! reconciler, and a failing repository does not stop the others. Fetching
//! overlaps freely, but store writes from all of them pass one write gate.

use crate::db::unit_of_work::{self, WriteGate};
use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::repository::{self, Repository, RepositoryReference};
use crate::models::sync_log::{LogStatus, SyncLogEntry};
use crate::services::github_client::{GitHubApi, GitHubIssue, GitHubLabel, GitHubMilestone};
use crate::services::pager::{self, Pager, RepoResource};
use crate::services::reconciler::{ReconcileStats, Reconciler, ReconcilerOptions};
use crate::services::sync_session::{self, SyncSession, DEFAULT_WATERMARK_MARGIN_SECS};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Distance between session start and the recorded watermark.
    pub watermark_margin_secs: i64,

    /// Items per page requested from the API (max 100).
    pub per_page: u32,

    /// Whether to fetch pull request details (branches, merge state, review requests).
    pub fetch_pull_details: bool,

    /// Number of repositories synced at the same time.
    pub concurrency: usize,

    /// Name recorded in the sync log. Defaults to the token's login.
    pub operator: Option<String>,

    /// Mark an unfinished earlier sync as abandoned instead of refusing to start.
    pub abandon_in_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watermark_margin_secs: DEFAULT_WATERMARK_MARGIN_SECS,
            per_page: pager::MAX_PER_PAGE,
            fetch_pull_details: true,
            concurrency: 1,
            operator: None,
            abandon_in_progress: false,
        }
    }
}

/// Outcome of syncing one repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub repository: String,
    pub status: LogStatus,
    pub log_entry: Option<SyncLogEntry>,
    pub labels: u64,
    pub milestones: u64,
    pub issues: u64,
    pub pages: u32,
    pub stats: ReconcileStats,
    pub error: Option<String>,
}

impl SyncResult {
    fn failed(repository: String, progress: Progress, log_entry: Option<SyncLogEntry>, error: &AppError) -> Self {
        Self {
            repository,
            status: LogStatus::Failed,
            log_entry,
            labels: progress.labels,
            milestones: progress.milestones,
            issues: progress.issues,
            pages: progress.pages,
            stats: progress.stats,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LogStatus::Completed
    }
}

/// Outcome of a multi-repository run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<SyncResult>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(SyncResult::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Counters gathered while a session runs; survives a failure.
#[derive(Debug, Clone, Default)]
struct Progress {
    labels: u64,
    milestones: u64,
    issues: u64,
    pages: u32,
    last_rate_limit: Option<i64>,
    stats: ReconcileStats,
}

impl Progress {
    fn note_page<T>(&mut self, pager: &Pager<'_, T>) {
        self.pages += 1;
        if let Some(rate_limit) = pager.rate_limit() {
            self.last_rate_limit = Some(rate_limit.remaining);
        }
    }
}

/// Drives sync sessions against one store and one API.
pub struct SyncEngine {
    pool: DbPool,
    api: Arc<dyn GitHubApi>,
    config: SyncConfig,
    write_gate: WriteGate,
}

impl SyncEngine {
    pub fn new(pool: DbPool, api: Arc<dyn GitHubApi>, config: SyncConfig) -> Self {
        Self {
            pool,
            api,
            config,
            write_gate: unit_of_work::write_gate(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Name to record in the sync log.
    pub async fn resolve_operator(&self) -> String {
        if let Some(operator) = &self.config.operator {
            return operator.clone();
        }
        match self.api.get_authenticated_user().await {
            Ok(user) => user.login,
            Err(e) => {
                log::warn!("Could not identify the token owner: {}", e);
                "anonymous".to_string()
            }
        }
    }

    /// Sync several repositories, continuing past failures.
    ///
    /// Fails up front, before any remote call, when the schema is not current.
    pub async fn sync_repositories(
        &self,
        references: &[RepositoryReference],
        cancel: &CancellationToken,
    ) -> Result<SyncReport, AppError> {
        db::ensure_schema_current(&self.pool).await?;

        let operator = self.resolve_operator().await;
        let concurrency = self.config.concurrency.max(1);
        log::info!(
            "Syncing {} repositories as {} (concurrency {})",
            references.len(),
            operator,
            concurrency
        );

        let mut results: Vec<(usize, SyncResult)> = stream::iter(references.iter().enumerate())
            .map(|(index, reference)| {
                let operator = operator.as_str();
                async move { (index, self.sync_repository(reference, operator, cancel).await) }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let report = SyncReport {
            results: results.into_iter().map(|(_, result)| result).collect(),
        };
        for failure in report.failures() {
            log::warn!(
                "{} failed: {}",
                failure.repository,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(report)
    }

    /// Sync one repository. Failures are reported in the result, after the
    /// session (if one was opened) has been finalized.
    pub async fn sync_repository(
        &self,
        reference: &RepositoryReference,
        operator: &str,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let mut progress = Progress::default();

        if cancel.is_cancelled() {
            let err = AppError::cancelled("Sync cancelled before it started");
            return SyncResult::failed(reference.to_string(), progress, None, &err);
        }

        let mut reconciler = Reconciler::new(
            self.api.as_ref(),
            self.pool.clone(),
            self.write_gate.clone(),
            ReconcilerOptions {
                fetch_pull_details: self.config.fetch_pull_details,
            },
        );

        let (repository, session) = match self.open_session(&mut reconciler, reference, operator).await {
            Ok(opened) => opened,
            Err(e) => {
                log::error!("Could not start sync of {}: {}", reference, e);
                return SyncResult::failed(reference.to_string(), progress, None, &e);
            }
        };

        let outcome = self
            .run_session(&mut reconciler, &repository, session.since(), cancel, &mut progress)
            .await;
        progress.stats = reconciler.stats().clone();
        let end_rate_limit = self.end_rate_limit(progress.last_rate_limit).await;

        match outcome {
            Ok(()) => match self.gated(session.complete(end_rate_limit)).await {
                Ok(entry) => SyncResult {
                    repository: repository.full_name(),
                    status: LogStatus::Completed,
                    log_entry: Some(entry),
                    labels: progress.labels,
                    milestones: progress.milestones,
                    issues: progress.issues,
                    pages: progress.pages,
                    stats: progress.stats,
                    error: None,
                },
                Err(e) => SyncResult::failed(repository.full_name(), progress, None, &e),
            },
            Err(e) => {
                // Keep what was reconciled before the failure
                if let Err(flush_err) = reconciler.flush().await {
                    log::warn!("Could not flush partial work for {}: {}", repository.full_name(), flush_err);
                    if let Err(rollback_err) = reconciler.discard().await {
                        log::warn!("Rollback failed: {}", rollback_err);
                    }
                }
                progress.stats = reconciler.stats().clone();
                let entry = match self.gated(session.fail(&e, end_rate_limit)).await {
                    Ok(entry) => Some(entry),
                    Err(log_err) => {
                        log::error!("Could not record failure of {}: {}", repository.full_name(), log_err);
                        None
                    }
                };
                SyncResult::failed(repository.full_name(), progress, entry, &e)
            }
        }
    }

    /// Check the local log, reconcile the repository row and open a session.
    async fn open_session(
        &self,
        reconciler: &mut Reconciler<'_>,
        reference: &RepositoryReference,
        operator: &str,
    ) -> Result<(Repository, SyncSession), AppError> {
        let known = {
            let mut conn = self.pool.acquire().await?;
            repository::find_by_name(&mut conn, &reference.owner, &reference.name).await?
        };
        if let Some(known) = &known {
            if self.config.abandon_in_progress {
                self.gated(sync_session::abandon_in_progress(&self.pool, known))
                    .await?;
            }
            let mut conn = self.pool.acquire().await?;
            sync_session::ensure_idle(&mut conn, known).await?;
        }

        let remote = self.api.get_repository(&reference.owner, &reference.name).await?;
        let repository = reconciler.sync_repository(&remote).await?;
        reconciler.flush().await?;

        let start_rate_limit = match self.api.rate_limit_remaining().await {
            Ok(remaining) => remaining,
            Err(e) => {
                log::warn!("Could not read rate limit: {}", e);
                None
            }
        };

        let session = self
            .gated(SyncSession::start(
                &self.pool,
                &repository,
                operator,
                start_rate_limit,
                sync_session::now(),
                self.config.watermark_margin_secs,
            ))
            .await?;

        Ok((repository, session))
    }

    async fn run_session(
        &self,
        reconciler: &mut Reconciler<'_>,
        repository: &Repository,
        since: Option<i64>,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), AppError> {
        let api = self.api.as_ref();
        let per_page = self.config.per_page;

        let mut labels: Pager<GitHubLabel> = Pager::for_repository(
            api,
            RepoResource::Labels,
            &repository.owner,
            &repository.name,
            pager::labels_query(per_page),
        );
        loop {
            let page = labels.next_page_or_cancel(cancel).await?;
            progress.note_page(&labels);
            for label in &page {
                reconciler.sync_label(repository, label).await?;
                progress.labels += 1;
            }
            reconciler.flush().await?;
            if labels.is_exhausted() {
                break;
            }
        }

        let mut milestones: Pager<GitHubMilestone> = Pager::for_repository(
            api,
            RepoResource::Milestones,
            &repository.owner,
            &repository.name,
            pager::milestones_query(per_page),
        );
        loop {
            let page = milestones.next_page_or_cancel(cancel).await?;
            progress.note_page(&milestones);
            for milestone in &page {
                reconciler.sync_milestone(repository, milestone).await?;
                progress.milestones += 1;
            }
            reconciler.flush().await?;
            if milestones.is_exhausted() {
                break;
            }
        }

        let mut issues: Pager<GitHubIssue> = Pager::for_repository(
            api,
            RepoResource::Issues,
            &repository.owner,
            &repository.name,
            pager::issues_query(since, per_page),
        );
        loop {
            let page = issues.next_page_or_cancel(cancel).await?;
            progress.note_page(&issues);
            for issue in &page {
                if cancel.is_cancelled() {
                    return Err(AppError::cancelled("Sync cancelled between issues"));
                }
                reconciler.sync_issue(repository, issue).await?;
                progress.issues += 1;
            }
            reconciler.flush().await?;
            log::debug!(
                "{}: page {} done ({} issues so far)",
                repository.full_name(),
                issues.pages_fetched(),
                progress.issues
            );
            if issues.is_exhausted() {
                break;
            }
        }

        Ok(())
    }

    /// Run a sync log write while no reconciler holds a transaction.
    ///
    /// Callers must have flushed or discarded their own reconciler first.
    async fn gated<T>(&self, write: impl std::future::Future<Output = T>) -> T {
        let _gate = self.write_gate.lock().await;
        write.await
    }

    async fn end_rate_limit(&self, last_seen: Option<i64>) -> Option<i64> {
        if last_seen.is_some() {
            return last_seen;
        }
        self.api.rate_limit_remaining().await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.watermark_margin_secs, 300);
        assert_eq!(config.per_page, 100);
        assert!(config.fetch_pull_details);
        assert_eq!(config.concurrency, 1);
        assert!(!config.abandon_in_progress);
    }

    #[test]
    fn test_report_success_requires_every_repository() {
        let ok = SyncResult {
            repository: "acme/widgets".to_string(),
            status: LogStatus::Completed,
            log_entry: None,
            labels: 0,
            milestones: 0,
            issues: 0,
            pages: 3,
            stats: ReconcileStats::default(),
            error: None,
        };
        let failed = SyncResult::failed(
            "acme/gadgets".to_string(),
            Progress::default(),
            None,
            &AppError::fetch("Server Error", 500, "/repos/acme/gadgets"),
        );

        let report = SyncReport {
            results: vec![ok.clone()],
        };
        assert!(report.is_success());

        let report = SyncReport {
            results: vec![ok, failed],
        };
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);
    }
}
