//! In-memory implementations of the Directory and Ledger traits.
//!
//! State lives behind a single `RwLock`, so every ledger operation is
//! trivially atomic. Used to exercise the engine without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ledger::{PullRequestLedger, ReplaceOutcome, StatusTransition};
use super::membership::MembershipDirectory;
use crate::error::AppError;
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus, User};

/// In-memory membership directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Flip a user's active flag; returns `false` if the user is unknown.
    pub async fn set_active(&self, user_id: &str, is_active: bool) -> bool {
        match self.users.write().await.get_mut(user_id) {
            Some(user) => {
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }

    /// Convenience seeding: one team, members given as `(id, is_active)`.
    pub async fn seed_team(&self, team_id: i64, team_name: &str, members: &[(&str, bool)]) {
        let now = Utc::now();
        for (id, is_active) in members {
            self.put_user(User {
                id: id.to_string(),
                username: id.to_string(),
                team_id,
                team_name: team_name.to_string(),
                is_active: *is_active,
                created_at: now,
                updated_at: now,
            })
            .await;
        }
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryDirectory {
    async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("User", user_id))
    }

    async fn active_members(
        &self,
        team_id: i64,
        exclude: &[String],
    ) -> Result<Vec<User>, AppError> {
        let users = self.users.read().await;
        let mut members: Vec<User> = users
            .values()
            .filter(|u| u.team_id == team_id && u.is_active && !exclude.contains(&u.id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(members)
    }
}

/// In-memory pull request ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    pull_requests: RwLock<HashMap<String, PullRequest>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PullRequestLedger for InMemoryLedger {
    async fn create_with_reviewers(&self, pr: &PullRequest) -> Result<PullRequest, AppError> {
        let mut prs = self.pull_requests.write().await;
        if prs.contains_key(&pr.id) {
            return Err(AppError::pr_exists(&pr.id));
        }
        prs.insert(pr.id.clone(), pr.clone());
        Ok(pr.clone())
    }

    async fn get(&self, id: &str) -> Result<PullRequest, AppError> {
        self.pull_requests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("PullRequest", id))
    }

    async fn transition_status(
        &self,
        id: &str,
        from: PullRequestStatus,
        to: PullRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusTransition, AppError> {
        let mut prs = self.pull_requests.write().await;
        let Some(pr) = prs.get_mut(id) else {
            return Ok(StatusTransition::NotFound);
        };

        if pr.status == from && from.can_transition_to(to) {
            pr.status = to;
            pr.merged_at = (to == PullRequestStatus::Merged).then_some(at);
            Ok(StatusTransition::Updated)
        } else if pr.status == to {
            Ok(StatusTransition::AlreadyInTargetState)
        } else {
            Err(AppError::internal(format!(
                "illegal status transition {} -> {}",
                from, to
            )))
        }
    }

    async fn replace_reviewer(
        &self,
        id: &str,
        old_reviewer: &str,
        new_reviewer: &str,
    ) -> Result<ReplaceOutcome, AppError> {
        let mut prs = self.pull_requests.write().await;
        let Some(pr) = prs.get_mut(id) else {
            return Ok(ReplaceOutcome::NotFound);
        };

        if !pr.is_open() {
            return Ok(ReplaceOutcome::NotOpen);
        }
        let Some(pos) = pr.assigned_reviewers.iter().position(|r| r == old_reviewer) else {
            return Ok(ReplaceOutcome::NotAssigned);
        };
        if pr.has_reviewer(new_reviewer) {
            return Ok(ReplaceOutcome::CandidateTaken);
        }

        pr.assigned_reviewers.remove(pos);
        pr.assigned_reviewers.push(new_reviewer.to_string());
        Ok(ReplaceOutcome::Replaced(pr.clone()))
    }

    async fn list_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequestShort>, AppError> {
        let prs = self.pull_requests.read().await;
        let mut matching: Vec<&PullRequest> =
            prs.values().filter(|pr| pr.has_reviewer(user_id)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .cloned()
            .map(PullRequestShort::from)
            .collect())
    }
}
