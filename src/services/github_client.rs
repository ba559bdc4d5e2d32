//! GitHub API client.
//!
//! Provides the [`GitHubApi`] trait the sync engine talks to and the
//! reqwest-backed [`GitHubClient`] implementation with token authentication,
//! `Link` header pagination and rate-limit header capture.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default API root for github.com.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Plain JSON media type.
pub const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Media type that includes reaction rollups on issues.
pub const ACCEPT_REACTIONS: &str =
    "application/vnd.github.squirrel-girl-preview+json, application/vnd.github+json";

/// GitHub API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubClientConfig {
    /// API root, `https://api.github.com` or a GitHub Enterprise `/api/v3` URL.
    pub base_url: String,

    /// Personal access token. Empty means anonymous access.
    #[serde(skip_serializing)]
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// User agent sent with every request (required by GitHub).
    pub user_agent: String,
}

impl Default for GitHubClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            timeout_secs: 30,
            user_agent: format!("hubsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Rate-limit snapshot from the `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub remaining: i64,
    pub limit: Option<i64>,
    /// Unix time the window resets.
    pub reset: Option<i64>,
}

/// One GET of a paginated resource.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub url: &'a str,
    /// Applied only when non-empty.
    pub query: &'a [(String, String)],
    pub accept: &'a str,
}

/// Undecoded response to a [`PageRequest`].
#[derive(Debug, Clone)]
pub struct RawPage {
    pub status: u16,
    pub body: String,
    /// Target of the `rel="next"` link, if any.
    pub next_url: Option<String>,
    pub rate_limit: Option<RateLimit>,
}

impl RawPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// User, bot or organization account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// `User`, `Bot` or `Organization`.
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

/// Team as it appears in `requested_teams`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubTeam {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Present on the team endpoints, absent on pull request payloads.
    #[serde(default)]
    pub organization: Option<GitHubUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub name: String,
    pub owner: GitHubUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubLabel {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubMilestone {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: String,
    #[serde(default)]
    pub due_on: Option<DateTime<Utc>>,
}

/// Reaction rollup of an issue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubReactions {
    pub total_count: i64,
    #[serde(rename = "+1")]
    pub plus1: i64,
    #[serde(rename = "-1")]
    pub minus1: i64,
    pub laugh: i64,
    pub hooray: i64,
    pub confused: i64,
    pub heart: i64,
    pub rocket: i64,
    pub eyes: i64,
}

/// Marker present on issues that are pull requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubPullRequestRef {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

/// Issue (or pull request) as listed by `/repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub id: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub html_url: Option<String>,
    pub user: GitHubUser,
    #[serde(default)]
    pub assignees: Vec<GitHubUser>,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    #[serde(default)]
    pub milestone: Option<GitHubMilestone>,
    #[serde(default)]
    pub pull_request: Option<GitHubPullRequestRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reactions: Option<GitHubReactions>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubBranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// Pull request details from `/repos/{owner}/{repo}/pulls/{number}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPullRequest {
    pub id: i64,
    pub number: i64,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    pub head: GitHubBranchRef,
    pub base: GitHubBranchRef,
    #[serde(default)]
    pub requested_reviewers: Vec<GitHubUser>,
    #[serde(default)]
    pub requested_teams: Vec<GitHubTeam>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Debug, Deserialize)]
struct RateLimitCore {
    remaining: i64,
}

/// The remote operations the sync engine depends on.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// API root without a trailing slash.
    fn base_url(&self) -> &str;

    /// Fetch one page. Non-success statuses are returned, not raised.
    async fn get_page(&self, request: PageRequest<'_>) -> Result<RawPage, AppError>;

    /// Repository snapshot. A missing repository yields a 404 fetch error.
    async fn get_repository(&self, owner: &str, name: &str) -> Result<GitHubRepository, AppError>;

    async fn get_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError>;

    /// The account the token belongs to.
    async fn get_authenticated_user(&self) -> Result<GitHubUser, AppError>;

    /// Remaining core quota, or `None` when the server does not report one.
    async fn rate_limit_remaining(&self) -> Result<Option<i64>, AppError>;
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(config: GitHubClientConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();

        if !config.token.is_empty() {
            let token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| AppError::authentication("Invalid token format"))?;
            headers.insert(header::AUTHORIZATION, token_value);
        }
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Absolute URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication(
                "GitHub rejected the token (401). Check --token or GITHUB_TOKEN.",
            ))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::fetch(
                error_message(status.as_u16(), &body),
                status.as_u16(),
                endpoint,
            ))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, AppError> {
        let url = self.api_url(endpoint);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, ACCEPT_JSON)
            .send()
            .await?;
        log::debug!("GET {} -> {}", url, response.status());
        self.handle_response(response, endpoint).await
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn get_page(&self, request: PageRequest<'_>) -> Result<RawPage, AppError> {
        let mut builder = self
            .client
            .get(request.url)
            .header(header::ACCEPT, request.accept);
        if !request.query.is_empty() {
            builder = builder.query(request.query);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let next_url = parse_next_link(response.headers());
        let rate_limit = parse_rate_limit(response.headers());
        log::debug!(
            "GET {} -> {} (remaining quota: {})",
            request.url,
            status,
            rate_limit
                .map(|r| r.remaining.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        let body = response.text().await?;
        Ok(RawPage {
            status,
            body,
            next_url,
            rate_limit,
        })
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<GitHubRepository, AppError> {
        let endpoint = format!(
            "/repos/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(name)
        );
        self.get_json(&endpoint).await
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError> {
        let endpoint = format!(
            "/repos/{}/{}/pulls/{}",
            urlencoding::encode(owner),
            urlencoding::encode(name),
            number
        );
        self.get_json(&endpoint).await
    }

    async fn get_authenticated_user(&self) -> Result<GitHubUser, AppError> {
        self.get_json("/user").await
    }

    async fn rate_limit_remaining(&self) -> Result<Option<i64>, AppError> {
        match self.get_json::<RateLimitResponse>("/rate_limit").await {
            Ok(limits) => Ok(Some(limits.resources.core.remaining)),
            // Enterprise servers with rate limiting disabled answer 404
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Human-readable message for a failed response.
pub fn error_message(status: u16, body: &str) -> String {
    let body_message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));

    match (status, body_message) {
        (_, Some(msg)) => msg,
        (403, None) => "Access denied".to_string(),
        (404, None) => "Resource not found".to_string(),
        (429, None) => "Rate limit exceeded".to_string(),
        _ => format!("Request failed ({})", status),
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(header::LINK)?.to_str().ok()?;

    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Read the `x-ratelimit-*` headers.
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimit> {
    let get_header = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    };

    Some(RateLimit {
        remaining: get_header("x-ratelimit-remaining")?,
        limit: get_header("x-ratelimit-limit"),
        reset: get_header("x-ratelimit-reset"),
    })
}
