//! Actor model: users, bots, organizations and teams.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Kind of actor. Fixed once the row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Bot,
    Organization,
    Team,
}

impl ActorKind {
    /// Map the remote `type` field of a user object.
    pub fn from_remote_type(remote_type: Option<&str>) -> Self {
        match remote_type.map(str::to_ascii_lowercase).as_deref() {
            Some("bot") => Self::Bot,
            Some("organization") => Self::Organization,
            _ => Self::User,
        }
    }

    pub fn is_team(self) -> bool {
        self == Self::Team
    }
}

impl From<&str> for ActorKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bot" => Self::Bot,
            "organization" => Self::Organization,
            "team" => Self::Team,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Bot => write!(f, "bot"),
            Self::Organization => write!(f, "organization"),
            Self::Team => write!(f, "team"),
        }
    }
}

/// A user, bot, organization or team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: i64,
    pub github_id: i64,
    pub node_id: Option<String>,
    /// `user`, `bot`, `organization` or `team`.
    pub kind: String,
    /// Login for users, bots and organizations; team name for teams.
    pub name: String,
    pub avatar_url: Option<String>,
    /// Owning organization login, teams only.
    pub organization: Option<String>,
}

impl Actor {
    pub fn kind_enum(&self) -> ActorKind {
        ActorKind::from(self.kind.as_str())
    }
}

/// Mutable fields copied from a remote snapshot.
#[derive(Debug, Clone)]
pub struct ActorFields<'a> {
    pub github_id: i64,
    pub node_id: Option<&'a str>,
    pub kind: ActorKind,
    pub name: &'a str,
    pub avatar_url: Option<&'a str>,
    pub organization: Option<&'a str>,
}

const SELECT_COLUMNS: &str =
    "SELECT id, github_id, node_id, kind, name, avatar_url, organization FROM actors";

/// Look up a user, bot or organization by remote id.
pub async fn find_account(
    conn: &mut SqliteConnection,
    github_id: i64,
) -> Result<Option<Actor>, sqlx::Error> {
    sqlx::query_as::<_, Actor>(&format!(
        "{} WHERE github_id = ? AND kind != 'team'",
        SELECT_COLUMNS
    ))
    .bind(github_id)
    .fetch_optional(conn)
    .await
}

/// Look up a team by organization and name. Comparison is case-insensitive.
pub async fn find_team(
    conn: &mut SqliteConnection,
    organization: &str,
    name: &str,
) -> Result<Option<Actor>, sqlx::Error> {
    sqlx::query_as::<_, Actor>(&format!(
        "{} WHERE kind = 'team' AND organization = ? AND name = ? COLLATE NOCASE",
        SELECT_COLUMNS
    ))
    .bind(organization)
    .bind(name)
    .fetch_optional(conn)
    .await
}

pub async fn insert(
    conn: &mut SqliteConnection,
    fields: &ActorFields<'_>,
) -> Result<Actor, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO actors (github_id, node_id, kind, name, avatar_url, organization)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(fields.github_id)
    .bind(fields.node_id)
    .bind(fields.kind.to_string())
    .bind(fields.name)
    .bind(fields.avatar_url)
    .bind(fields.organization)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(Actor {
        id,
        github_id: fields.github_id,
        node_id: fields.node_id.map(str::to_string),
        kind: fields.kind.to_string(),
        name: fields.name.to_string(),
        avatar_url: fields.avatar_url.map(str::to_string),
        organization: fields.organization.map(str::to_string),
    })
}

/// Overwrite mutable fields. The kind column is never touched.
pub async fn update(conn: &mut SqliteConnection, actor: &Actor) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE actors SET github_id = ?, node_id = ?, name = ?, avatar_url = ?, organization = ?
         WHERE id = ?",
    )
    .bind(actor.github_id)
    .bind(&actor.node_id)
    .bind(&actor.name)
    .bind(&actor.avatar_url)
    .bind(&actor.organization)
    .bind(actor.id)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    #[test]
    fn test_kind_from_remote_type() {
        assert_eq!(ActorKind::from_remote_type(Some("User")), ActorKind::User);
        assert_eq!(ActorKind::from_remote_type(Some("Bot")), ActorKind::Bot);
        assert_eq!(
            ActorKind::from_remote_type(Some("Organization")),
            ActorKind::Organization
        );
        assert_eq!(ActorKind::from_remote_type(None), ActorKind::User);
        assert_eq!(ActorKind::from("team"), ActorKind::Team);
        assert_eq!(ActorKind::Team.to_string(), "team");
    }

    #[tokio::test]
    async fn test_team_and_user_ids_do_not_collide() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let user = insert(
            &mut conn,
            &ActorFields {
                github_id: 7,
                node_id: None,
                kind: ActorKind::User,
                name: "octocat",
                avatar_url: None,
                organization: None,
            },
        )
        .await
        .unwrap();
        let team = insert(
            &mut conn,
            &ActorFields {
                github_id: 7,
                node_id: None,
                kind: ActorKind::Team,
                name: "Core",
                avatar_url: None,
                organization: Some("acme"),
            },
        )
        .await
        .unwrap();
        assert_ne!(user.id, team.id);

        let found = find_team(&mut conn, "acme", "core").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(team.id));
        let found = find_account(&mut conn, 7).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_update_keeps_kind() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let mut bot = insert(
            &mut conn,
            &ActorFields {
                github_id: 9,
                node_id: None,
                kind: ActorKind::Bot,
                name: "dependabot",
                avatar_url: None,
                organization: None,
            },
        )
        .await
        .unwrap();

        bot.name = "dependabot[bot]".to_string();
        bot.kind = "user".to_string();
        update(&mut conn, &bot).await.unwrap();

        let stored = find_account(&mut conn, 9).await.unwrap().unwrap();
        assert_eq!(stored.name, "dependabot[bot]");
        assert_eq!(stored.kind_enum(), ActorKind::Bot);
    }
}
