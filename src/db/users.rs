//! Database queries for users.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::pool::DbPool;
use crate::models::User;

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.team_id, t.name AS team_name,
           u.is_active, u.created_at, u.updated_at
    FROM users u
    INNER JOIN teams t ON t.id = u.team_id
"#;

/// Fetch a user with their team name.
pub async fn get_user(pool: &DbPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("{} WHERE u.id = ?", USER_SELECT))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Active members of `team_id` whose id is not in `exclude`, ordered by id.
pub async fn get_active_members(
    pool: &DbPool,
    team_id: i64,
    exclude: &[String],
) -> Result<Vec<User>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(USER_SELECT);
    builder.push(" WHERE u.team_id = ");
    builder.push_bind(team_id);
    builder.push(" AND u.is_active = 1");

    if !exclude.is_empty() {
        builder.push(" AND u.id NOT IN (");
        let mut separated = builder.separated(", ");
        for id in exclude {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");
    }

    builder.push(" ORDER BY u.id");

    builder.build_query_as::<User>().fetch_all(pool).await
}

/// All members of a team, ordered by id.
pub async fn list_team_members(
    conn: &mut SqliteConnection,
    team_id: i64,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("{} WHERE u.team_id = ? ORDER BY u.id", USER_SELECT))
        .bind(team_id)
        .fetch_all(conn)
        .await
}

/// Insert a user, or move an existing one into `team_id` with fresh details.
pub async fn upsert_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    username: &str,
    team_id: i64,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, team_id, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            username = excluded.username,
            team_id = excluded.team_id,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(username)
    .bind(team_id)
    .bind(is_active)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Flip a user's active flag. Returns `false` when the user does not exist.
pub async fn set_is_active(
    pool: &DbPool,
    user_id: &str,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(is_active)
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
