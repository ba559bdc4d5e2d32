//! Milestone model.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// A repository milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: i64,
    pub repository_id: i64,
    pub github_id: i64,
    pub node_id: Option<String>,
    pub number: i64,
    pub title: String,
    pub description: Option<String>,
    /// `open` or `closed`.
    pub state: String,
    /// Unix timestamp.
    pub due_on: Option<i64>,
}

const SELECT_COLUMNS: &str = "SELECT id, repository_id, github_id, node_id, number, title, description, state, due_on FROM milestones";

pub async fn find_by_github_id(
    conn: &mut SqliteConnection,
    github_id: i64,
) -> Result<Option<Milestone>, sqlx::Error> {
    sqlx::query_as::<_, Milestone>(&format!("{} WHERE github_id = ?", SELECT_COLUMNS))
        .bind(github_id)
        .fetch_optional(conn)
        .await
}

pub async fn find_by_number(
    conn: &mut SqliteConnection,
    repository_id: i64,
    number: i64,
) -> Result<Option<Milestone>, sqlx::Error> {
    sqlx::query_as::<_, Milestone>(&format!(
        "{} WHERE repository_id = ? AND number = ?",
        SELECT_COLUMNS
    ))
    .bind(repository_id)
    .bind(number)
    .fetch_optional(conn)
    .await
}

pub async fn insert(
    conn: &mut SqliteConnection,
    milestone: &Milestone,
) -> Result<Milestone, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO milestones (repository_id, github_id, node_id, number, title, description, state, due_on)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(milestone.repository_id)
    .bind(milestone.github_id)
    .bind(&milestone.node_id)
    .bind(milestone.number)
    .bind(&milestone.title)
    .bind(&milestone.description)
    .bind(&milestone.state)
    .bind(milestone.due_on)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Milestone {
        id,
        ..milestone.clone()
    })
}

pub async fn update(conn: &mut SqliteConnection, milestone: &Milestone) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE milestones SET github_id = ?, node_id = ?, number = ?, title = ?, description = ?, state = ?, due_on = ?
         WHERE id = ?",
    )
    .bind(milestone.github_id)
    .bind(&milestone.node_id)
    .bind(milestone.number)
    .bind(&milestone.title)
    .bind(&milestone.description)
    .bind(&milestone.state)
    .bind(milestone.due_on)
    .bind(milestone.id)
    .execute(conn)
    .await?;
    Ok(())
}
