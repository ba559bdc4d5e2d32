//! Issue and pull request model.
//!
//! Both variants live in the `issues` table; `kind` tells them apart and the
//! pull request columns stay NULL on plain issues.

use super::actor::Actor;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Issue variant. Chosen when the row is created and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Issue,
    PullRequest,
}

impl From<&str> for IssueKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pull_request" => Self::PullRequest,
            _ => Self::Issue,
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// Reaction counters copied from the remote snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct Reactions {
    #[sqlx(rename = "reactions_total")]
    pub total: i64,
    #[sqlx(rename = "reactions_plus1")]
    pub plus1: i64,
    #[sqlx(rename = "reactions_minus1")]
    pub minus1: i64,
    #[sqlx(rename = "reactions_laugh")]
    pub laugh: i64,
    #[sqlx(rename = "reactions_hooray")]
    pub hooray: i64,
    #[sqlx(rename = "reactions_confused")]
    pub confused: i64,
    #[sqlx(rename = "reactions_heart")]
    pub heart: i64,
    #[sqlx(rename = "reactions_rocket")]
    pub rocket: i64,
    #[sqlx(rename = "reactions_eyes")]
    pub eyes: i64,
}

/// Pull request columns. All `None` on plain issues and on pull requests
/// whose details were never fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct PullRequestDetails {
    pub merged_at: Option<i64>,
    pub merged: Option<bool>,
    pub merge_commit_sha: Option<String>,
    pub draft: Option<bool>,
    pub head_ref: Option<String>,
    pub head_sha: Option<String>,
    pub base_ref: Option<String>,
    pub base_sha: Option<String>,
}

/// A mirrored issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub repository_id: i64,
    pub github_id: i64,
    pub node_id: Option<String>,
    pub number: i64,
    /// `issue` or `pull_request`.
    pub kind: String,
    pub title: String,
    pub body: String,
    /// `open` or `closed`.
    pub state: String,
    pub locked: bool,
    pub comment_count: i64,
    pub html_url: Option<String>,
    pub author_id: i64,
    pub milestone_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    #[sqlx(flatten)]
    pub reactions: Reactions,
    #[sqlx(flatten)]
    pub pull_request: PullRequestDetails,
}

impl Issue {
    pub fn kind_enum(&self) -> IssueKind {
        IssueKind::from(self.kind.as_str())
    }

    pub fn is_pull_request(&self) -> bool {
        self.kind_enum() == IssueKind::PullRequest
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, repository_id, github_id, node_id, number, kind, title, body, state, locked,
           comment_count, html_url, author_id, milestone_id, created_at, updated_at, closed_at,
           reactions_total, reactions_plus1, reactions_minus1, reactions_laugh, reactions_hooray,
           reactions_confused, reactions_heart, reactions_rocket, reactions_eyes,
           merged_at, merged, merge_commit_sha, draft, head_ref, head_sha, base_ref, base_sha
    FROM issues
"#;

pub async fn find_by_github_id(
    conn: &mut SqliteConnection,
    github_id: i64,
) -> Result<Option<Issue>, sqlx::Error> {
    sqlx::query_as::<_, Issue>(&format!("{} WHERE github_id = ?", SELECT_COLUMNS))
        .bind(github_id)
        .fetch_optional(conn)
        .await
}

pub async fn find_by_number(
    conn: &mut SqliteConnection,
    repository_id: i64,
    number: i64,
) -> Result<Option<Issue>, sqlx::Error> {
    sqlx::query_as::<_, Issue>(&format!(
        "{} WHERE repository_id = ? AND number = ?",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .bind(number)
    .fetch_optional(conn)
    .await
}

/// Insert a new row with the given variant and a placeholder author; the
/// caller copies the mutable fields with [`update`] right after.
pub async fn insert(conn: &mut SqliteConnection, issue: &Issue) -> Result<Issue, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO issues (repository_id, github_id, node_id, number, kind, title, state, author_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(issue.repository_id)
    .bind(issue.github_id)
    .bind(&issue.node_id)
    .bind(issue.number)
    .bind(&issue.kind)
    .bind(&issue.title)
    .bind(&issue.state)
    .bind(issue.author_id)
    .bind(issue.created_at)
    .bind(issue.updated_at)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Issue {
        id,
        ..issue.clone()
    })
}

/// Overwrite every mutable column. `kind` is never written here.
pub async fn update(conn: &mut SqliteConnection, issue: &Issue) -> Result<(), sqlx::Error> {
    let r = &issue.reactions;
    let pr = &issue.pull_request;
    sqlx::query(
        r#"
        UPDATE issues SET
            repository_id = ?, github_id = ?, node_id = ?, number = ?, title = ?, body = ?,
            state = ?, locked = ?, comment_count = ?, html_url = ?, author_id = ?,
            milestone_id = ?, created_at = ?, updated_at = ?, closed_at = ?,
            reactions_total = ?, reactions_plus1 = ?, reactions_minus1 = ?, reactions_laugh = ?,
            reactions_hooray = ?, reactions_confused = ?, reactions_heart = ?,
            reactions_rocket = ?, reactions_eyes = ?,
            merged_at = ?, merged = ?, merge_commit_sha = ?, draft = ?,
            head_ref = ?, head_sha = ?, base_ref = ?, base_sha = ?
        WHERE id = ?
        "#,
    )
    .bind(issue.repository_id)
    .bind(issue.github_id)
    .bind(&issue.node_id)
    .bind(issue.number)
    .bind(&issue.title)
    .bind(&issue.body)
    .bind(&issue.state)
    .bind(issue.locked)
    .bind(issue.comment_count)
    .bind(&issue.html_url)
    .bind(issue.author_id)
    .bind(issue.milestone_id)
    .bind(issue.created_at)
    .bind(issue.updated_at)
    .bind(issue.closed_at)
    .bind(r.total)
    .bind(r.plus1)
    .bind(r.minus1)
    .bind(r.laugh)
    .bind(r.hooray)
    .bind(r.confused)
    .bind(r.heart)
    .bind(r.rocket)
    .bind(r.eyes)
    .bind(pr.merged_at)
    .bind(pr.merged)
    .bind(&pr.merge_commit_sha)
    .bind(pr.draft)
    .bind(&pr.head_ref)
    .bind(&pr.head_sha)
    .bind(&pr.base_ref)
    .bind(&pr.base_sha)
    .bind(issue.id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn count_for_repository(
    conn: &mut SqliteConnection,
    repository_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM issues WHERE repository_id = ?")
        .bind(repository_id)
        .fetch_one(conn)
        .await
}

/// Which actor join table to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorCollection {
    Assignees,
    ReviewRequests,
}

impl ActorCollection {
    fn table(self) -> &'static str {
        match self {
            Self::Assignees => "issue_assignees",
            Self::ReviewRequests => "review_requests",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            Self::Assignees => "issue_id",
            Self::ReviewRequests => "pull_request_id",
        }
    }
}

/// Actors in a collection of an issue, with their join row ids.
pub async fn actors_in(
    conn: &mut SqliteConnection,
    collection: ActorCollection,
    issue_id: i64,
) -> Result<Vec<(i64, Actor)>, sqlx::Error> {
    #[derive(FromRow)]
    struct Row {
        join_id: i64,
        #[sqlx(flatten)]
        actor: Actor,
    }

    let sql = format!(
        "SELECT j.id AS join_id, a.id, a.github_id, a.node_id, a.kind, a.name, a.avatar_url, a.organization
         FROM {table} j JOIN actors a ON a.id = j.actor_id
         WHERE j.{owner} = ?
         ORDER BY j.id",
        table = collection.table(),
        owner = collection.owner_column(),
    );

    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(issue_id)
        .fetch_all(conn)
        .await?;

    Ok(rows.into_iter().map(|r| (r.join_id, r.actor)).collect())
}

pub async fn add_actor(
    conn: &mut SqliteConnection,
    collection: ActorCollection,
    issue_id: i64,
    actor_id: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} ({}, actor_id) VALUES (?, ?)",
        collection.table(),
        collection.owner_column()
    );
    sqlx::query(&sql)
        .bind(issue_id)
        .bind(actor_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn remove_actor(
    conn: &mut SqliteConnection,
    collection: ActorCollection,
    join_id: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
    sqlx::query(&sql).bind(join_id).execute(conn).await?;
    Ok(())
}
