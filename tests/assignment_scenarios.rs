//! End-to-end assignment scenarios against a real SQLite database.
//!
//! These drive the engine through the SQLite ledger and directory the
//! server uses, covering:
//! 1. Create / merge / reassign on a small team
//! 2. Reassignment with no eligible replacement
//! 3. Selection fairness over many seeded trials
//! 4. Cancellation leaving no partial writes

use std::collections::HashSet;
use std::sync::Arc;

use reviewer_assignment_lib::db::pool::DbPool;
use reviewer_assignment_lib::error::AppError;
use reviewer_assignment_lib::models::PullRequestStatus;
use reviewer_assignment_lib::services::engine::CreatePullRequest;
use reviewer_assignment_lib::services::teams::{self, NewTeam, NewTeamMember};
use reviewer_assignment_lib::services::{
    PullRequestLedger, ReviewerEngine, SqliteDirectory, SqliteLedger,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

async fn setup_test_db() -> DbPool {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    // Keep the dir alive by leaking it (for test purposes)
    std::mem::forget(dir);

    reviewer_assignment_lib::db::initialize(&db_path).await.unwrap()
}

/// Create a team whose members are given as `(user_id, is_active)`.
async fn add_team(pool: &DbPool, name: &str, members: &[(&str, bool)]) {
    teams::create_team(
        pool,
        NewTeam {
            team_name: name.to_string(),
            members: members
                .iter()
                .map(|(id, active)| NewTeamMember {
                    user_id: id.to_string(),
                    username: format!("user-{}", id),
                    is_active: *active,
                })
                .collect(),
        },
    )
    .await
    .unwrap();
}

fn engine(pool: &DbPool, seed: u64) -> ReviewerEngine {
    ReviewerEngine::with_seed(
        Arc::new(SqliteLedger::new(pool.clone())),
        Arc::new(SqliteDirectory::new(pool.clone())),
        seed,
    )
}

fn create(id: &str, author: &str) -> CreatePullRequest {
    CreatePullRequest {
        id: id.to_string(),
        name: format!("Change {}", id),
        author_id: author.to_string(),
    }
}

#[tokio::test]
async fn test_create_merge_then_reassign_is_rejected() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true), ("u3", true)]).await;
    let engine = engine(&pool, 7);
    let cancel = CancellationToken::new();

    let pr = engine.create_pull_request(&cancel, create("pr1", "u1")).await.unwrap();
    assert_eq!(pr.status, PullRequestStatus::Open);
    let reviewers: HashSet<&str> = pr.assigned_reviewers.iter().map(String::as_str).collect();
    assert_eq!(reviewers, HashSet::from(["u2", "u3"]));

    let merged = engine.merge_pull_request(&cancel, "pr1").await.unwrap();
    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert!(merged.merged_at.is_some());

    let err = engine.reassign_reviewer(&cancel, "pr1", "u2").await.unwrap_err();
    assert!(matches!(err, AppError::PrMerged { .. }));
}

#[tokio::test]
async fn test_reassign_without_candidates() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true), ("u3", false)]).await;
    let engine = engine(&pool, 7);
    let cancel = CancellationToken::new();

    let pr = engine.create_pull_request(&cancel, create("pr2", "u1")).await.unwrap();
    assert_eq!(pr.assigned_reviewers, vec!["u2".to_string()]);

    let err = engine.reassign_reviewer(&cancel, "pr2", "u2").await.unwrap_err();
    assert!(matches!(err, AppError::NoCandidate { .. }));

    // The failed reassignment left the reviewer in place
    let pr = engine.ledger().get("pr2").await.unwrap();
    assert_eq!(pr.assigned_reviewers, vec!["u2".to_string()]);
}

#[tokio::test]
async fn test_reassign_replaces_within_old_reviewers_team() {
    let pool = setup_test_db().await;
    add_team(
        &pool,
        "backend",
        &[("u1", true), ("u2", true), ("u3", true), ("u4", true), ("u5", false)],
    )
    .await;
    add_team(&pool, "frontend", &[("f1", true)]).await;
    let engine = engine(&pool, 11);
    let cancel = CancellationToken::new();

    let pr = engine.create_pull_request(&cancel, create("pr3", "u1")).await.unwrap();
    assert_eq!(pr.assigned_reviewers.len(), 2);
    let old = pr.assigned_reviewers[0].clone();

    let result = engine.reassign_reviewer(&cancel, "pr3", &old).await.unwrap();
    let new = &result.replaced_by;

    assert!(!result.pull_request.has_reviewer(&old));
    assert!(result.pull_request.has_reviewer(new));
    assert_ne!(new, "u1");
    assert_ne!(new, "u5");
    assert_ne!(new, "f1");
    assert!(!pr.has_reviewer(new));
    assert_eq!(result.pull_request.assigned_reviewers.len(), 2);

    // Persisted state matches the returned pull request
    let stored = engine.ledger().get("pr3").await.unwrap();
    assert_eq!(stored.assigned_reviewers, result.pull_request.assigned_reviewers);
}

#[tokio::test]
async fn test_reassign_unassigned_user_on_merged_pr_is_not_assigned() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    let engine = engine(&pool, 3);
    let cancel = CancellationToken::new();

    let pr = engine.create_pull_request(&cancel, create("pr4", "u1")).await.unwrap();
    let outsider = ["u2", "u3", "u4"]
        .into_iter()
        .find(|id| !pr.has_reviewer(id))
        .unwrap();

    engine.merge_pull_request(&cancel, "pr4").await.unwrap();

    let err = engine.reassign_reviewer(&cancel, "pr4", outsider).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssigned { .. }));
}

#[tokio::test]
async fn test_merge_twice_keeps_timestamp() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true)]).await;
    let engine = engine(&pool, 1);
    let cancel = CancellationToken::new();

    engine.create_pull_request(&cancel, create("pr5", "u1")).await.unwrap();
    let first = engine.merge_pull_request(&cancel, "pr5").await.unwrap();
    let second = engine.merge_pull_request(&cancel, "pr5").await.unwrap();

    assert_eq!(second.status, PullRequestStatus::Merged);
    assert_eq!(first.merged_at, second.merged_at);
}

#[tokio::test]
async fn test_author_from_empty_team_gets_no_reviewers() {
    let pool = setup_test_db().await;
    add_team(&pool, "solo", &[("u1", true), ("u2", false)]).await;
    let engine = engine(&pool, 1);

    let pr = engine
        .create_pull_request(&CancellationToken::new(), create("pr6", "u1"))
        .await
        .unwrap();
    assert!(pr.assigned_reviewers.is_empty());
}

#[tokio::test]
async fn test_all_pairs_are_selected_across_seeds() {
    let pool = setup_test_db().await;
    add_team(
        &pool,
        "backend",
        &[("u1", true), ("u2", true), ("u3", true), ("u4", true), ("u5", true)],
    )
    .await;
    let cancel = CancellationToken::new();

    let mut pairs = HashSet::new();
    for seed in 0..200u64 {
        let engine = engine(&pool, seed);
        let pr = engine
            .create_pull_request(&cancel, create(&format!("pr-{}", seed), "u1"))
            .await
            .unwrap();

        assert_eq!(pr.assigned_reviewers.len(), 2);
        assert!(!pr.has_reviewer("u1"));
        assert_ne!(pr.assigned_reviewers[0], pr.assigned_reviewers[1]);

        let mut pair = pr.assigned_reviewers.clone();
        pair.sort();
        pairs.insert(pair);
    }

    // C(4, 2) pairs from u2..u5
    assert_eq!(pairs.len(), 6);
}

#[tokio::test]
async fn test_cancelled_create_writes_nothing() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true)]).await;
    let engine = engine(&pool, 1);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .create_pull_request(&cancel, create("pr7", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled { .. }));

    let err = engine.ledger().get("pr7").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_reviews_listed_for_reviewer() {
    let pool = setup_test_db().await;
    add_team(&pool, "backend", &[("u1", true), ("u2", true)]).await;
    let engine = engine(&pool, 1);
    let cancel = CancellationToken::new();

    engine.create_pull_request(&cancel, create("pr8", "u1")).await.unwrap();
    engine.create_pull_request(&cancel, create("pr9", "u1")).await.unwrap();
    engine.merge_pull_request(&cancel, "pr8").await.unwrap();

    let reviews = engine.ledger().list_by_reviewer("u2").await.unwrap();
    let ids: HashSet<&str> = reviews.iter().map(|r| r.pull_request_id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["pr8", "pr9"]));

    assert!(engine.ledger().list_by_reviewer("u1").await.unwrap().is_empty());
}
