//! User activation and review lookups.

use chrono::Utc;

use super::ledger::PullRequestLedger;
use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::{PullRequestShort, User};

/// Set a user's active flag and return the updated user.
///
/// Inactive users stay on the pull requests they already review; they are
/// only skipped when new reviewers are picked.
pub async fn set_is_active(pool: &DbPool, user_id: &str, is_active: bool) -> Result<User, AppError> {
    if user_id.is_empty() {
        return Err(AppError::missing_field("user_id"));
    }

    let updated = db::users::set_is_active(pool, user_id, is_active, Utc::now())
        .await
        .map_err(|e| {
            log::error!("[users] Failed to update active flag of {}: {}", user_id, e);
            AppError::database_with_op(e.to_string(), "set_is_active")
        })?;

    if !updated {
        return Err(AppError::not_found_with_id("User", user_id));
    }

    log::info!("[users] User {} is_active = {}", user_id, is_active);

    db::users::get_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("User", user_id))
}

/// Pull requests on which `user_id` is a reviewer.
pub async fn get_reviews(
    ledger: &dyn PullRequestLedger,
    user_id: &str,
) -> Result<Vec<PullRequestShort>, AppError> {
    if user_id.is_empty() {
        return Err(AppError::missing_field("user_id"));
    }

    ledger.list_by_reviewer(user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::teams::{create_team, NewTeam, NewTeamMember};
    use tempfile::tempdir;

    async fn setup_test_db() -> DbPool {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        // Keep the dir alive by leaking it (for test purposes)
        std::mem::forget(dir);

        let pool = crate::db::initialize(&db_path).await.unwrap();
        create_team(
            &pool,
            NewTeam {
                team_name: "backend".to_string(),
                members: vec![NewTeamMember {
                    user_id: "u1".to_string(),
                    username: "Alice".to_string(),
                    is_active: true,
                }],
            },
        )
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_set_is_active() {
        let pool = setup_test_db().await;

        let user = set_is_active(&pool, "u1", false).await.unwrap();
        assert!(!user.is_active);
        assert_eq!(user.team_name, "backend");

        let user = set_is_active(&pool, "u1", true).await.unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_set_is_active_errors() {
        let pool = setup_test_db().await;

        let err = set_is_active(&pool, "", true).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));

        let err = set_is_active(&pool, "ghost", true).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_reviews_requires_user_id() {
        let ledger = crate::services::memory::InMemoryLedger::new();

        let err = get_reviews(&ledger, "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
        assert!(get_reviews(&ledger, "u1").await.unwrap().is_empty());
    }
}
