//! Database queries for teams.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

/// Team row without members.
#[derive(Debug, Clone, FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Insert a team and return its store-assigned id.
///
/// A duplicate name surfaces as a unique violation (see
/// [`super::is_unique_violation`]).
pub async fn insert_team(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("INSERT INTO teams (name, created_at) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(now)
        .fetch_one(conn)
        .await
}

/// Fetch a team by its unique name.
pub async fn get_team_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<TeamRow>, sqlx::Error> {
    sqlx::query_as::<_, TeamRow>("SELECT id, name, created_at FROM teams WHERE name = ?")
        .bind(name)
        .fetch_optional(conn)
        .await
}
