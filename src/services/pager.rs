//! Lazy page-at-a-time fetching of paginated GitHub resources.
//!
//! A [`Pager`] starts at a resource URL with its query parameters, then
//! follows the `rel="next"` links the server hands back. Query parameters are
//! sent with the first request only; continuation URLs already carry them.

use crate::error::AppError;
use crate::services::github_client::{GitHubApi, PageRequest, RateLimit, ACCEPT_JSON, ACCEPT_REACTIONS};
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// Default and maximum page size GitHub accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// A paginated collection under `/repos/{owner}/{repo}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoResource {
    Issues,
    Labels,
    Milestones,
}

impl RepoResource {
    fn segment(self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::Labels => "labels",
            Self::Milestones => "milestones",
        }
    }

    /// Media type to request. Issues need the reaction rollups.
    pub fn accept(self) -> &'static str {
        match self {
            Self::Issues => ACCEPT_REACTIONS,
            Self::Labels | Self::Milestones => ACCEPT_JSON,
        }
    }

    pub fn url(self, base_url: &str, owner: &str, name: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(owner),
            urlencoding::encode(name),
            self.segment()
        )
    }
}

/// First-page query for the issue listing: everything, oldest update first,
/// optionally restricted to issues updated at or after `since` (Unix).
pub fn issues_query(since: Option<i64>, per_page: u32) -> Vec<(String, String)> {
    let mut query = vec![
        ("state".to_string(), "all".to_string()),
        ("sort".to_string(), "updated".to_string()),
        ("direction".to_string(), "asc".to_string()),
        ("per_page".to_string(), per_page.min(MAX_PER_PAGE).to_string()),
    ];
    if let Some(since) = since.and_then(|s| Utc.timestamp_opt(s, 0).single()) {
        query.push((
            "since".to_string(),
            since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ));
    }
    query
}

pub fn labels_query(per_page: u32) -> Vec<(String, String)> {
    vec![("per_page".to_string(), per_page.min(MAX_PER_PAGE).to_string())]
}

pub fn milestones_query(per_page: u32) -> Vec<(String, String)> {
    vec![
        ("state".to_string(), "all".to_string()),
        ("per_page".to_string(), per_page.min(MAX_PER_PAGE).to_string()),
    ]
}

/// Page-at-a-time reader of one paginated resource.
pub struct Pager<'a, T> {
    api: &'a dyn GitHubApi,
    next_url: Option<String>,
    query: Vec<(String, String)>,
    accept: &'static str,
    rate_limit: Option<RateLimit>,
    pages_fetched: u32,
    _item: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Pager<'a, T> {
    /// A pager starting at `url`. A `None` url yields no pages at all.
    pub fn new(
        api: &'a dyn GitHubApi,
        url: Option<String>,
        query: Vec<(String, String)>,
        accept: &'static str,
    ) -> Self {
        Self {
            api,
            next_url: url,
            query,
            accept,
            rate_limit: None,
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    /// A pager over a repository collection.
    pub fn for_repository(
        api: &'a dyn GitHubApi,
        resource: RepoResource,
        owner: &str,
        name: &str,
        query: Vec<(String, String)>,
    ) -> Self {
        let url = resource.url(api.base_url(), owner, name);
        Self::new(api, Some(url), query, resource.accept())
    }

    /// Fetch the next page.
    ///
    /// Returns an empty page once the resource is exhausted; calling again
    /// after that keeps returning empty pages. A non-success status is a
    /// [`AppError::Fetch`] and leaves the pager where it was.
    pub async fn next_page(&mut self) -> Result<Vec<T>, AppError> {
        let Some(url) = self.next_url.as_deref() else {
            return Ok(Vec::new());
        };

        let page = self
            .api
            .get_page(PageRequest {
                url,
                query: &self.query,
                accept: self.accept,
            })
            .await?;

        if page.rate_limit.is_some() {
            self.rate_limit = page.rate_limit;
        }

        if !page.is_success() {
            return Err(AppError::fetch(
                crate::services::github_client::error_message(page.status, &page.body),
                page.status,
                url,
            ));
        }

        let items: Vec<T> = serde_json::from_str(&page.body)?;

        self.next_url = page.next_url;
        self.query.clear();
        self.pages_fetched += 1;
        log::trace!(
            "Page {} decoded: {} items, more: {}",
            self.pages_fetched,
            items.len(),
            self.next_url.is_some()
        );

        Ok(items)
    }

    /// [`Pager::next_page`], aborted with [`AppError::Cancelled`] as soon as
    /// `cancel` fires.
    pub async fn next_page_or_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, AppError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::cancelled("Sync cancelled while fetching")),
            page = self.next_page() => page,
        }
    }
}

impl<T> Pager<'_, T> {
    pub fn is_exhausted(&self) -> bool {
        self.next_url.is_none()
    }

    /// Latest rate-limit snapshot reported by the server.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::github_client::{
        GitHubPullRequest, GitHubRepository, GitHubUser, RawPage,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves scripted pages and records every request.
    struct ScriptedApi {
        pages: Mutex<Vec<RawPage>>,
        requests: Mutex<Vec<(String, Vec<(String, String)>, String)>>,
    }

    impl ScriptedApi {
        fn new(pages: Vec<RawPage>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    fn page(status: u16, body: &str, next: Option<&str>, remaining: Option<i64>) -> RawPage {
        RawPage {
            status,
            body: body.to_string(),
            next_url: next.map(str::to_string),
            rate_limit: remaining.map(|remaining| RateLimit {
                remaining,
                limit: Some(5000),
                reset: None,
            }),
        }
    }

    #[async_trait]
    impl GitHubApi for ScriptedApi {
        fn base_url(&self) -> &str {
            "https://api.test"
        }

        async fn get_page(&self, request: PageRequest<'_>) -> Result<RawPage, AppError> {
            self.requests.lock().unwrap().push((
                request.url.to_string(),
                request.query.to_vec(),
                request.accept.to_string(),
            ));
            self.pages
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AppError::internal("no scripted page left"))
        }

        async fn get_repository(&self, owner: &str, name: &str) -> Result<GitHubRepository, AppError> {
            Err(AppError::not_found_with_id("Repository", format!("{}/{}", owner, name)))
        }

        async fn get_pull_request(
            &self,
            _owner: &str,
            _name: &str,
            number: i64,
        ) -> Result<GitHubPullRequest, AppError> {
            Err(AppError::not_found_with_id("Pull request", number.to_string()))
        }

        async fn get_authenticated_user(&self) -> Result<GitHubUser, AppError> {
            Err(AppError::authentication("anonymous"))
        }

        async fn rate_limit_remaining(&self) -> Result<Option<i64>, AppError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_follows_next_links_and_clears_query() {
        let api = ScriptedApi::new(vec![
            page(200, "[1, 2]", Some("https://api.test/page2"), Some(4999)),
            page(200, "[3]", None, Some(4998)),
        ]);
        let mut pager: Pager<i64> = Pager::for_repository(
            &api,
            RepoResource::Labels,
            "acme",
            "widgets",
            labels_query(100),
        );

        assert_eq!(pager.next_page().await.unwrap(), vec![1, 2]);
        assert!(!pager.is_exhausted());
        assert_eq!(pager.next_page().await.unwrap(), vec![3]);
        assert!(pager.is_exhausted());
        assert_eq!(pager.rate_limit().map(|r| r.remaining), Some(4998));
        assert_eq!(pager.pages_fetched(), 2);

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests[0].0, "https://api.test/repos/acme/widgets/labels");
        assert_eq!(requests[0].1, vec![("per_page".to_string(), "100".to_string())]);
        assert_eq!(requests[1].0, "https://api.test/page2");
        assert!(requests[1].1.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_pager_returns_empty_without_requests() {
        let api = ScriptedApi::new(vec![page(200, "[1]", None, None)]);
        let mut pager: Pager<i64> = Pager::new(&api, Some("https://api.test/x".into()), vec![], ACCEPT_JSON);

        assert_eq!(pager.next_page().await.unwrap(), vec![1]);
        for _ in 0..3 {
            assert!(pager.next_page().await.unwrap().is_empty());
        }
        assert_eq!(api.request_count(), 1);
    }

    #[tokio::test]
    async fn test_absent_url_yields_nothing() {
        let api = ScriptedApi::new(vec![]);
        let mut pager: Pager<i64> = Pager::new(&api, None, vec![], ACCEPT_JSON);

        assert!(pager.is_exhausted());
        assert!(pager.next_page().await.unwrap().is_empty());
        assert_eq!(api.request_count(), 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let api = ScriptedApi::new(vec![page(502, "", None, Some(10))]);
        let mut pager: Pager<i64> = Pager::new(&api, Some("https://api.test/x".into()), vec![], ACCEPT_JSON);

        let err = pager.next_page().await.unwrap_err();
        assert_eq!(err.status_code(), Some(502));
        match err {
            AppError::Fetch { endpoint, .. } => assert_eq!(endpoint, "https://api.test/x"),
            other => panic!("expected fetch error, got {:?}", other),
        }
        // No automatic retry, and the pager did not advance
        assert_eq!(api.request_count(), 1);
        assert!(!pager.is_exhausted());
        assert_eq!(pager.rate_limit().map(|r| r.remaining), Some(10));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_fetching() {
        let api = ScriptedApi::new(vec![page(200, "[1]", None, None)]);
        let mut pager: Pager<i64> = Pager::new(&api, Some("https://api.test/x".into()), vec![], ACCEPT_JSON);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pager.next_page_or_cancel(&cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled { .. }));
        assert_eq!(api.request_count(), 0);
    }

    #[test]
    fn test_issues_query_since() {
        let query = issues_query(Some(1_705_314_600), 250);
        assert!(query.contains(&("per_page".to_string(), "100".to_string())));
        assert!(query.contains(&("since".to_string(), "2024-01-15T10:30:00Z".to_string())));
        assert!(query.contains(&("state".to_string(), "all".to_string())));

        let full = issues_query(None, 50);
        assert!(!full.iter().any(|(k, _)| k == "since"));
    }

    #[test]
    fn test_issue_listing_requests_reactions() {
        assert_eq!(RepoResource::Issues.accept(), ACCEPT_REACTIONS);
        assert_eq!(
            RepoResource::Milestones.url("https://api.test/", "acme", "widgets"),
            "https://api.test/repos/acme/widgets/milestones"
        );
    }
}
