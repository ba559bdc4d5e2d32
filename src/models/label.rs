//! Label model.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// A repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: i64,
    pub repository_id: i64,
    pub github_id: i64,
    pub node_id: Option<String>,
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, repository_id, github_id, node_id, name, color, description FROM labels";

pub async fn find_by_github_id(
    conn: &mut SqliteConnection,
    github_id: i64,
) -> Result<Option<Label>, sqlx::Error> {
    sqlx::query_as::<_, Label>(&format!("{} WHERE github_id = ?", SELECT_COLUMNS))
        .bind(github_id)
        .fetch_optional(conn)
        .await
}

/// Alternate key lookup; label names are unique per repository ignoring case.
pub async fn find_by_name(
    conn: &mut SqliteConnection,
    repository_id: i64,
    name: &str,
) -> Result<Option<Label>, sqlx::Error> {
    sqlx::query_as::<_, Label>(&format!(
        "{} WHERE repository_id = ? AND name = ?",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .bind(name)
    .fetch_optional(conn)
    .await
}

pub async fn insert(conn: &mut SqliteConnection, label: &Label) -> Result<Label, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO labels (repository_id, github_id, node_id, name, color, description)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(label.repository_id)
    .bind(label.github_id)
    .bind(&label.node_id)
    .bind(&label.name)
    .bind(&label.color)
    .bind(&label.description)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Label {
        id,
        ..label.clone()
    })
}

pub async fn update(conn: &mut SqliteConnection, label: &Label) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE labels SET github_id = ?, node_id = ?, name = ?, color = ?, description = ?
         WHERE id = ?",
    )
    .bind(label.github_id)
    .bind(&label.node_id)
    .bind(&label.name)
    .bind(&label.color)
    .bind(&label.description)
    .bind(label.id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Labels currently attached to an issue, with their join row ids.
pub async fn for_issue(
    conn: &mut SqliteConnection,
    issue_id: i64,
) -> Result<Vec<(i64, Label)>, sqlx::Error> {
    #[derive(FromRow)]
    struct Row {
        join_id: i64,
        #[sqlx(flatten)]
        label: Label,
    }

    let rows = sqlx::query_as::<_, Row>(
        "SELECT il.id AS join_id, l.id, l.repository_id, l.github_id, l.node_id, l.name, l.color, l.description
         FROM issue_labels il JOIN labels l ON l.id = il.label_id
         WHERE il.issue_id = ?
         ORDER BY il.id",
    )
    .bind(issue_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|r| (r.join_id, r.label)).collect())
}

pub async fn attach(
    conn: &mut SqliteConnection,
    issue_id: i64,
    label_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO issue_labels (issue_id, label_id) VALUES (?, ?)")
        .bind(issue_id)
        .bind(label_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn detach(conn: &mut SqliteConnection, join_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM issue_labels WHERE id = ?")
        .bind(join_id)
        .execute(conn)
        .await?;
    Ok(())
}
