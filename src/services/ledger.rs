//! Pull Request Ledger: owns pull request lifecycle state and reviewer sets.
//!
//! Every multi-statement operation runs in one SQLite transaction. A
//! transaction that is dropped before `commit` (early return, error, or a
//! cancelled future) rolls back, so no partial write survives.
//!
//! Concurrency outcomes that callers must handle are returned as typed
//! variants ([`StatusTransition`], [`ReplaceOutcome`]) rather than errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus};

/// Result of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// This call moved the pull request into the target state.
    Updated,
    /// The pull request was already in the target state; nothing changed.
    AlreadyInTargetState,
    /// No pull request with this id.
    NotFound,
}

/// Result of an atomic reviewer replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Old reviewer removed, new reviewer inserted; carries the refreshed state.
    Replaced(PullRequest),
    /// The pull request is no longer OPEN.
    NotOpen,
    /// The old reviewer is not (or no longer) assigned.
    NotAssigned,
    /// No pull request with this id.
    NotFound,
    /// The new reviewer was assigned concurrently by another operation.
    CandidateTaken,
}

#[async_trait]
pub trait PullRequestLedger: Send + Sync {
    /// Persist a new OPEN pull request together with its initial reviewers.
    ///
    /// Fails with `PrExists` if the id is taken.
    async fn create_with_reviewers(&self, pr: &PullRequest) -> Result<PullRequest, AppError>;

    /// Fetch a pull request by id. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> Result<PullRequest, AppError>;

    /// Move `id` from `from` to `to` only if it is currently in `from`.
    async fn transition_status(
        &self,
        id: &str,
        from: PullRequestStatus,
        to: PullRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusTransition, AppError>;

    /// Replace `old_reviewer` with `new_reviewer` while the pull request is OPEN.
    async fn replace_reviewer(
        &self,
        id: &str,
        old_reviewer: &str,
        new_reviewer: &str,
    ) -> Result<ReplaceOutcome, AppError>;

    /// Pull requests on which `user_id` is a reviewer, newest first.
    async fn list_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequestShort>, AppError>;
}

/// Ledger backed by the SQLite store.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn storage_error(operation: &str, id: &str, err: sqlx::Error) -> AppError {
    log::error!("[ledger] {} failed for pull request {}: {}", operation, id, err);
    AppError::database_with_op(err.to_string(), operation)
}

#[async_trait]
impl PullRequestLedger for SqliteLedger {
    async fn create_with_reviewers(&self, pr: &PullRequest) -> Result<PullRequest, AppError> {
        if !pr.is_open() || pr.merged_at.is_some() {
            return Err(AppError::internal(format!(
                "pull request {} must be created OPEN without a merge time",
                pr.id
            )));
        }
        if pr.has_reviewer(&pr.author_id) {
            return Err(AppError::internal(format!(
                "author {} cannot review pull request {}",
                pr.author_id, pr.id
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", &pr.id, e))?;

        if let Err(e) = db::pull_requests::insert_pull_request(&mut tx, pr).await {
            if db::is_unique_violation(&e) {
                return Err(AppError::pr_exists(&pr.id));
            }
            return Err(storage_error("insert pull request", &pr.id, e));
        }

        for reviewer in &pr.assigned_reviewers {
            db::pull_requests::insert_reviewer(&mut tx, &pr.id, reviewer, pr.created_at)
                .await
                .map_err(|e| storage_error("assign reviewer", &pr.id, e))?;
        }

        let created = db::pull_requests::get_pull_request(&mut tx, &pr.id)
            .await
            .map_err(|e| storage_error("reload", &pr.id, e))?
            .ok_or_else(|| AppError::internal(format!("pull request {} vanished", pr.id)))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("commit", &pr.id, e))?;

        log::debug!(
            "[ledger] Stored pull request {} with {} reviewer(s)",
            created.id,
            created.assigned_reviewers.len()
        );

        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<PullRequest, AppError> {
        // A read transaction gives one snapshot for the row and its reviewers.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", id, e))?;

        let pr = db::pull_requests::get_pull_request(&mut tx, id)
            .await
            .map_err(|e| storage_error("get", id, e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("commit", id, e))?;

        pr.ok_or_else(|| AppError::not_found_with_id("PullRequest", id))
    }

    async fn transition_status(
        &self,
        id: &str,
        from: PullRequestStatus,
        to: PullRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusTransition, AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::internal(format!(
                "illegal status transition {} -> {}",
                from, to
            )));
        }

        let merged_at = (to == PullRequestStatus::Merged).then_some(at);
        let updated = db::pull_requests::update_status_if(&self.pool, id, from, to, merged_at)
            .await
            .map_err(|e| storage_error("update status", id, e))?;

        if updated > 0 {
            return Ok(StatusTransition::Updated);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| storage_error("acquire", id, e))?;

        match db::pull_requests::get_status(&mut conn, id)
            .await
            .map_err(|e| storage_error("get status", id, e))?
        {
            None => Ok(StatusTransition::NotFound),
            Some(current) if current == to => Ok(StatusTransition::AlreadyInTargetState),
            Some(current) => Err(AppError::internal(format!(
                "pull request {} is {} after failed {} -> {} update",
                id, current, from, to
            ))),
        }
    }

    async fn replace_reviewer(
        &self,
        id: &str,
        old_reviewer: &str,
        new_reviewer: &str,
    ) -> Result<ReplaceOutcome, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", id, e))?;

        // The guarded delete is the first statement so the transaction holds
        // the write lock before anything else is read.
        let removed = db::pull_requests::delete_reviewer_if_open(&mut tx, id, old_reviewer)
            .await
            .map_err(|e| storage_error("remove reviewer", id, e))?;

        if removed == 0 {
            let status = db::pull_requests::get_status(&mut tx, id)
                .await
                .map_err(|e| storage_error("get status", id, e))?;

            return Ok(match status {
                None => ReplaceOutcome::NotFound,
                Some(PullRequestStatus::Merged) => ReplaceOutcome::NotOpen,
                Some(PullRequestStatus::Open) => ReplaceOutcome::NotAssigned,
            });
        }

        if let Err(e) =
            db::pull_requests::insert_reviewer(&mut tx, id, new_reviewer, Utc::now()).await
        {
            if db::is_unique_violation(&e) {
                return Ok(ReplaceOutcome::CandidateTaken);
            }
            return Err(storage_error("insert reviewer", id, e));
        }

        let refreshed = db::pull_requests::get_pull_request(&mut tx, id)
            .await
            .map_err(|e| storage_error("reload", id, e))?
            .ok_or_else(|| AppError::internal(format!("pull request {} vanished", id)))?;

        if refreshed.author_id == new_reviewer {
            return Err(AppError::internal(format!(
                "author {} cannot review pull request {}",
                new_reviewer, id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("commit", id, e))?;

        Ok(ReplaceOutcome::Replaced(refreshed))
    }

    async fn list_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequestShort>, AppError> {
        db::pull_requests::list_by_reviewer(&self.pool, user_id)
            .await
            .map_err(|e| storage_error("list by reviewer", user_id, e))
    }
}
