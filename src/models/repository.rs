//! Repository model and the `owner/name` reference parser.

use regex::Regex;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};
use std::str::FromStr;
use std::sync::LazyLock;

/// A mirrored repository.
///
/// `github_id` is `None` for stub rows: repositories that are referenced from
/// an issue body but could not be read remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub github_id: Option<i64>,
    pub node_id: Option<String>,
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Stub rows have never been observed remotely.
    pub fn is_stub(&self) -> bool {
        self.github_id.is_none()
    }

    pub fn reference(&self) -> RepositoryReference {
        RepositoryReference::new(&self.owner, &self.name)
    }
}

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://(?:www\.)?github\.com/)?(?P<owner>[A-Za-z0-9_-]+)/(?P<repo>[A-Za-z0-9_.-]+?)/?$",
    )
    .unwrap_or_else(|e| panic!("invalid repository reference pattern: {}", e))
});

/// A repository named by owner and name, as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryReference {
    pub owner: String,
    pub name: String,
}

impl RepositoryReference {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Case-insensitive comparison, matching how the remote treats names.
    pub fn matches(&self, owner: &str, name: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner) && self.name.eq_ignore_ascii_case(name)
    }
}

impl FromStr for RepositoryReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = REFERENCE_PATTERN
            .captures(s.trim())
            .ok_or_else(|| format!("'{}' is not a repository reference (expected owner/name)", s))?;
        Ok(Self::new(&caps["owner"], &caps["repo"]))
    }
}

impl std::fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, github_id, node_id, owner, name FROM repositories";

pub async fn find_by_github_id(
    conn: &mut SqliteConnection,
    github_id: i64,
) -> Result<Option<Repository>, sqlx::Error> {
    sqlx::query_as::<_, Repository>(&format!("{} WHERE github_id = ?", SELECT_COLUMNS))
        .bind(github_id)
        .fetch_optional(conn)
        .await
}

/// Look a repository up by name. Comparison is case-insensitive.
pub async fn find_by_name(
    conn: &mut SqliteConnection,
    owner: &str,
    name: &str,
) -> Result<Option<Repository>, sqlx::Error> {
    sqlx::query_as::<_, Repository>(&format!(
        "{} WHERE owner = ? AND name = ?",
        SELECT_COLUMNS
    ))
    .bind(owner)
    .bind(name)
    .fetch_optional(conn)
    .await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Repository, sqlx::Error> {
    sqlx::query_as::<_, Repository>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_one(conn)
        .await
}

pub async fn insert(
    conn: &mut SqliteConnection,
    github_id: Option<i64>,
    node_id: Option<&str>,
    owner: &str,
    name: &str,
) -> Result<Repository, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO repositories (github_id, node_id, owner, name) VALUES (?, ?, ?, ?)",
    )
    .bind(github_id)
    .bind(node_id)
    .bind(owner)
    .bind(name)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Repository {
        id,
        github_id,
        node_id: node_id.map(str::to_string),
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Overwrite the mutable fields of an existing row.
pub async fn update(conn: &mut SqliteConnection, repository: &Repository) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE repositories SET github_id = ?, node_id = ?, owner = ?, name = ? WHERE id = ?")
        .bind(repository.github_id)
        .bind(&repository.node_id)
        .bind(&repository.owner)
        .bind(&repository.name)
        .bind(repository.id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list(pool: &sqlx::SqlitePool) -> Result<Vec<Repository>, sqlx::Error> {
    sqlx::query_as::<_, Repository>(&format!("{} ORDER BY owner, name", SELECT_COLUMNS))
        .fetch_all(pool)
        .await
}
