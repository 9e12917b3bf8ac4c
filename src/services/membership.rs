//! Membership Directory: read-only view of users and their teams.
//!
//! The reviewer engine only ever asks two questions: which team does this
//! user belong to, and who in that team can review right now.

use async_trait::async_trait;

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::User;

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Fetch a user by id. Fails with `NotFound` if absent.
    async fn get_user(&self, user_id: &str) -> Result<User, AppError>;

    /// Active members of `team_id` whose id is not in `exclude`.
    ///
    /// The result is unordered from the caller's point of view; `is_active`
    /// is the only eligibility rule applied here.
    async fn active_members(&self, team_id: i64, exclude: &[String])
        -> Result<Vec<User>, AppError>;
}

/// Directory backed by the SQLite store.
#[derive(Clone)]
pub struct SqliteDirectory {
    pool: DbPool,
}

impl SqliteDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipDirectory for SqliteDirectory {
    async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        db::users::get_user(&self.pool, user_id)
            .await
            .map_err(|e| {
                log::error!("[directory] Failed to get user {}: {}", user_id, e);
                AppError::database_with_op(e.to_string(), "get_user")
            })?
            .ok_or_else(|| AppError::not_found_with_id("User", user_id))
    }

    async fn active_members(
        &self,
        team_id: i64,
        exclude: &[String],
    ) -> Result<Vec<User>, AppError> {
        db::users::get_active_members(&self.pool, team_id, exclude)
            .await
            .map_err(|e| {
                log::error!(
                    "[directory] Failed to get active members of team {}: {}",
                    team_id,
                    e
                );
                AppError::database_with_op(e.to_string(), "active_members")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_test_db() -> DbPool {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        // Keep the dir alive by leaking it (for test purposes)
        std::mem::forget(dir);

        let pool = crate::db::initialize(&db_path).await.unwrap();
        let now = "2024-01-01T00:00:00Z";

        sqlx::query("INSERT INTO teams (id, name, created_at) VALUES (1, 'backend', ?), (2, 'frontend', ?)")
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();

        for (id, team_id, active) in [
            ("u1", 1, true),
            ("u2", 1, true),
            ("u3", 1, false),
            ("u4", 1, true),
            ("u5", 2, true),
        ] {
            sqlx::query(
                "INSERT INTO users (id, username, team_id, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(format!("user-{}", id))
            .bind(team_id)
            .bind(active)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }

        pool
    }

    fn ids(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_user_resolves_team() {
        let directory = SqliteDirectory::new(setup_test_db().await);

        let user = directory.get_user("u5").await.unwrap();
        assert_eq!(user.team_id, 2);
        assert_eq!(user.team_name, "frontend");
        assert_eq!(user.username, "user-u5");
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let directory = SqliteDirectory::new(setup_test_db().await);

        let err = directory.get_user("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_active_members_skips_inactive_and_other_teams() {
        let directory = SqliteDirectory::new(setup_test_db().await);

        let members = directory.active_members(1, &[]).await.unwrap();
        assert_eq!(ids(&members), vec!["u1", "u2", "u4"]);
    }

    #[tokio::test]
    async fn test_active_members_applies_exclusions() {
        let directory = SqliteDirectory::new(setup_test_db().await);

        let exclude = vec!["u1".to_string(), "u4".to_string(), "nobody".to_string()];
        let members = directory.active_members(1, &exclude).await.unwrap();
        assert_eq!(ids(&members), vec!["u2"]);

        let exclude_all = vec!["u1".to_string(), "u2".to_string(), "u4".to_string()];
        assert!(directory.active_members(1, &exclude_all).await.unwrap().is_empty());
    }
}
