//! Cross references parsed from issue bodies.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// An outbound link from one issue to another, possibly in another repository.
///
/// `target_issue_id` stays `None` until the target issue has been mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IssueLink {
    pub id: i64,
    pub issue_id: i64,
    /// Lower-cased keyword such as `fixes` or `duplicate`.
    pub link_type: String,
    pub target_repository_id: i64,
    pub number: i64,
    pub target_issue_id: Option<i64>,
}

pub async fn for_issue(
    conn: &mut SqliteConnection,
    issue_id: i64,
) -> Result<Vec<IssueLink>, sqlx::Error> {
    sqlx::query_as::<_, IssueLink>(
        "SELECT id, issue_id, link_type, target_repository_id, number, target_issue_id
         FROM issue_links WHERE issue_id = ? ORDER BY id",
    )
    .bind(issue_id)
    .fetch_all(conn)
    .await
}

pub async fn delete_for_issue(
    conn: &mut SqliteConnection,
    issue_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM issue_links WHERE issue_id = ?")
        .bind(issue_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert(
    conn: &mut SqliteConnection,
    issue_id: i64,
    link_type: &str,
    target_repository_id: i64,
    number: i64,
    target_issue_id: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO issue_links (issue_id, link_type, target_repository_id, number, target_issue_id)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(issue_id)
    .bind(link_type)
    .bind(target_repository_id)
    .bind(number)
    .bind(target_issue_id)
    .execute(conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Point pending links at target issues that have since been mirrored.
pub async fn resolve_pending(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE issue_links
        SET target_issue_id = (
            SELECT i.id FROM issues i
            WHERE i.repository_id = issue_links.target_repository_id
              AND i.number = issue_links.number
        )
        WHERE target_issue_id IS NULL
          AND EXISTS (
            SELECT 1 FROM issues i
            WHERE i.repository_id = issue_links.target_repository_id
              AND i.number = issue_links.number
          )
        "#,
    )
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_pending(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM issue_links WHERE target_issue_id IS NULL")
        .fetch_one(conn)
        .await
}
