//! Shared fixtures: an in-memory GitHub and a migrated scratch database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hubsync::db::{self, pool::DbPool};
use hubsync::services::github_client::{
    GitHubApi, GitHubBranchRef, GitHubIssue, GitHubLabel, GitHubMilestone, GitHubPullRequest,
    GitHubPullRequestRef, GitHubRepository, GitHubTeam, GitHubUser, PageRequest, RateLimit, RawPage,
};
use hubsync::services::sync_engine::{SyncConfig, SyncEngine};
use hubsync::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE_URL: &str = "https://github.test";
pub const RATE_LIMIT: i64 = 5000;

/// Create a migrated database in a temp directory.
pub async fn setup_db() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("mirror.db")).await.unwrap();
    (dir, pool)
}

/// Config with a fixed operator and two items per page.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        operator: Some("alice".to_string()),
        per_page: 2,
        ..Default::default()
    }
}

pub fn engine(pool: &DbPool, fake: &Arc<FakeGitHub>) -> SyncEngine {
    engine_with(pool, fake, test_config())
}

pub fn engine_with(pool: &DbPool, fake: &Arc<FakeGitHub>, config: SyncConfig) -> SyncEngine {
    let api: Arc<dyn GitHubApi> = fake.clone();
    SyncEngine::new(pool.clone(), api, config)
}

pub fn now() -> i64 {
    hubsync::services::sync_session::now()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn user(id: i64, login: &str) -> GitHubUser {
    GitHubUser {
        id,
        node_id: Some(format!("U_{}", id)),
        login: login.to_string(),
        avatar_url: Some(format!("https://avatars.test/u/{}", id)),
        account_type: Some("User".to_string()),
    }
}

pub fn team(id: i64, name: &str) -> GitHubTeam {
    GitHubTeam {
        id,
        node_id: Some(format!("T_{}", id)),
        name: name.to_string(),
        slug: Some(name.to_lowercase()),
        organization: None,
    }
}

pub fn label(id: i64, name: &str) -> GitHubLabel {
    GitHubLabel {
        id,
        node_id: Some(format!("L_{}", id)),
        name: name.to_string(),
        color: "ededed".to_string(),
        description: None,
    }
}

pub fn milestone(id: i64, number: i64, title: &str) -> GitHubMilestone {
    GitHubMilestone {
        id,
        node_id: Some(format!("M_{}", id)),
        number,
        title: title.to_string(),
        description: None,
        state: "open".to_string(),
        due_on: None,
    }
}

/// An open issue authored by user 1.
pub fn issue(id: i64, number: i64, title: &str, updated_at: i64) -> GitHubIssue {
    GitHubIssue {
        id,
        node_id: Some(format!("I_{}", id)),
        number,
        title: title.to_string(),
        body: None,
        state: "open".to_string(),
        locked: false,
        comments: 0,
        html_url: Some(format!("https://github.test/issues/{}", number)),
        user: user(1, "octocat"),
        assignees: Vec::new(),
        labels: Vec::new(),
        milestone: None,
        pull_request: None,
        created_at: at(updated_at - 3600),
        updated_at: at(updated_at),
        closed_at: None,
        reactions: None,
    }
}

/// A pull request listing entry.
pub fn pull_issue(id: i64, number: i64, title: &str, updated_at: i64) -> GitHubIssue {
    GitHubIssue {
        pull_request: Some(GitHubPullRequestRef::default()),
        ..issue(id, number, title, updated_at)
    }
}

pub fn pull_details(id: i64, number: i64) -> GitHubPullRequest {
    GitHubPullRequest {
        id,
        number,
        merged_at: None,
        merged: Some(false),
        merge_commit_sha: None,
        draft: Some(false),
        head: GitHubBranchRef {
            ref_name: format!("feature-{}", number),
            sha: "aaaa".to_string(),
        },
        base: GitHubBranchRef {
            ref_name: "main".to_string(),
            sha: "bbbb".to_string(),
        },
        requested_reviewers: Vec::new(),
        requested_teams: Vec::new(),
    }
}

/// One repository as the fake serves it.
#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub info: GitHubRepository,
    pub labels: Vec<GitHubLabel>,
    pub milestones: Vec<GitHubMilestone>,
    pub issues: Vec<GitHubIssue>,
    pub pulls: HashMap<i64, GitHubPullRequest>,
    /// Issue pages beyond this many answer 500.
    pub fail_issues_after: Option<u32>,
}

/// A page request as received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct State {
    repos: HashMap<String, FakeRepo>,
    requests: Vec<RecordedRequest>,
}

/// In-memory GitHub with `Link`-style pagination.
#[derive(Default)]
pub struct FakeGitHub {
    state: Mutex<State>,
    calls: AtomicUsize,
}

fn key(owner: &str, name: &str) -> String {
    format!("{}/{}", owner.to_lowercase(), name.to_lowercase())
}

impl FakeGitHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_repo(&self, id: i64, owner: &str, name: &str) {
        let info = GitHubRepository {
            id,
            node_id: Some(format!("R_{}", id)),
            name: name.to_string(),
            owner: GitHubUser {
                account_type: Some("Organization".to_string()),
                ..user(id + 10_000, owner)
            },
        };
        self.state.lock().unwrap().repos.insert(
            key(owner, name),
            FakeRepo {
                info,
                labels: Vec::new(),
                milestones: Vec::new(),
                issues: Vec::new(),
                pulls: HashMap::new(),
                fail_issues_after: None,
            },
        );
    }

    pub fn update_repo(&self, full_name: &str, change: impl FnOnce(&mut FakeRepo)) {
        let (owner, name) = full_name.split_once('/').unwrap();
        let mut state = self.state.lock().unwrap();
        let repo = state.repos.get_mut(&key(owner, name)).unwrap();
        change(repo);
    }

    /// Total remote operations served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// First-page requests of the issue listing, in order.
    pub fn issue_listings(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/issues"))
            .collect()
    }

    fn tick(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            remaining: RATE_LIMIT - self.calls() as i64,
            limit: Some(RATE_LIMIT),
            reset: None,
        }
    }

    fn not_found_page(&self) -> RawPage {
        RawPage {
            status: 404,
            body: r#"{"message":"Not Found"}"#.to_string(),
            next_url: None,
            rate_limit: Some(self.rate_limit()),
        }
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    async fn get_page(&self, request: PageRequest<'_>) -> Result<RawPage, AppError> {
        self.tick();

        let (path, query_string) = match request.url.split_once('?') {
            Some((path, qs)) => (path, Some(qs)),
            None => (request.url, None),
        };
        let params: Vec<(String, String)> = match query_string {
            Some(qs) => qs
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            None => request.query.to_vec(),
        };

        let mut state = self.state.lock().unwrap();
        state.requests.push(RecordedRequest {
            url: request.url.to_string(),
            query: params.clone(),
        });

        let param = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        let page: usize = param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let per_page: usize = param("per_page").and_then(|p| p.parse().ok()).unwrap_or(30);
        let since = param("since");

        let segments: Vec<&str> = path
            .trim_start_matches(BASE_URL)
            .trim_start_matches('/')
            .split('/')
            .collect();
        let [_, owner, name, resource] = segments.as_slice() else {
            drop(state);
            return Ok(self.not_found_page());
        };
        let Some(repo) = state.repos.get(&key(owner, name)) else {
            drop(state);
            return Ok(self.not_found_page());
        };

        let items: Vec<serde_json::Value> = match *resource {
            "labels" => repo.labels.iter().map(|l| serde_json::to_value(l).unwrap()).collect(),
            "milestones" => repo
                .milestones
                .iter()
                .map(|m| serde_json::to_value(m).unwrap())
                .collect(),
            "issues" => {
                if let Some(limit) = repo.fail_issues_after {
                    if page as u32 > limit {
                        drop(state);
                        return Ok(RawPage {
                            status: 500,
                            body: r#"{"message":"Server Error"}"#.to_string(),
                            next_url: None,
                            rate_limit: Some(self.rate_limit()),
                        });
                    }
                }
                let since = since
                    .as_deref()
                    .map(|s| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc));
                let mut issues: Vec<&GitHubIssue> = repo
                    .issues
                    .iter()
                    .filter(|i| since.map_or(true, |since| i.updated_at >= since))
                    .collect();
                issues.sort_by_key(|i| i.updated_at);
                issues
                    .into_iter()
                    .map(|i| serde_json::to_value(i).unwrap())
                    .collect()
            }
            _ => {
                drop(state);
                return Ok(self.not_found_page());
            }
        };
        drop(state);

        let start = (page - 1) * per_page;
        let slice: Vec<serde_json::Value> = items.iter().skip(start).take(per_page).cloned().collect();
        let next_url = (start + per_page < items.len()).then(|| {
            let mut url = format!("{}?page={}&per_page={}", path, page + 1, per_page);
            if let Some(since) = &since {
                url.push_str(&format!("&since={}", since));
            }
            url
        });

        Ok(RawPage {
            status: 200,
            body: serde_json::to_string(&slice).unwrap(),
            next_url,
            rate_limit: Some(self.rate_limit()),
        })
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<GitHubRepository, AppError> {
        self.tick();
        self.state
            .lock()
            .unwrap()
            .repos
            .get(&key(owner, name))
            .map(|r| r.info.clone())
            .ok_or_else(|| AppError::fetch("Not Found", 404, format!("/repos/{}/{}", owner, name)))
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError> {
        self.tick();
        let endpoint = format!("/repos/{}/{}/pulls/{}", owner, name, number);
        self.state
            .lock()
            .unwrap()
            .repos
            .get(&key(owner, name))
            .and_then(|r| r.pulls.get(&number).cloned())
            .ok_or_else(|| AppError::fetch("Not Found", 404, endpoint))
    }

    async fn get_authenticated_user(&self) -> Result<GitHubUser, AppError> {
        self.tick();
        Ok(user(999, "token-owner"))
    }

    async fn rate_limit_remaining(&self) -> Result<Option<i64>, AppError> {
        self.tick();
        Ok(Some(self.rate_limit().remaining))
    }
}
