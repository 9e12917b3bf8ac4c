//! Reviewer Assignment Engine.
//!
//! Decides who reviews what and drives the ledger through valid state
//! changes. The engine holds no locks around storage: every guarantee under
//! concurrency comes from the ledger's transactional operations. Its only
//! private state is a seedable PRNG, so tests can pin selections.
//!
//! Every operation takes a [`CancellationToken`]. When the token fires, the
//! in-flight operation future is dropped, which rolls back any open
//! transaction, and the call fails with [`AppError::Cancelled`].

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::ledger::{PullRequestLedger, ReplaceOutcome, StatusTransition};
use super::membership::MembershipDirectory;
use crate::error::AppError;
use crate::models::{PullRequest, PullRequestStatus, User};

/// Upper bound on reviewers picked when a pull request is created.
pub const MAX_INITIAL_REVIEWERS: usize = 2;

/// Longest accepted pull request id.
pub const MAX_PULL_REQUEST_ID_LEN: usize = 100;

/// Reassignment attempts before giving up when candidates keep being
/// taken by concurrent reassignments.
const MAX_REASSIGN_ATTEMPTS: usize = 3;

/// Input for [`ReviewerEngine::create_pull_request`].
#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub id: String,
    pub name: String,
    pub author_id: String,
}

impl CreatePullRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.id.is_empty() {
            return Err(AppError::missing_field("pull_request_id"));
        }
        if self.id.chars().count() > MAX_PULL_REQUEST_ID_LEN {
            return Err(AppError::invalid_input_field(
                format!("pull_request_id too long (max {} characters)", MAX_PULL_REQUEST_ID_LEN),
                "pull_request_id",
            ));
        }
        if self.name.is_empty() {
            return Err(AppError::missing_field("pull_request_name"));
        }
        if self.author_id.is_empty() {
            return Err(AppError::missing_field("author_id"));
        }
        Ok(())
    }
}

/// Outcome of a successful reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub pull_request: PullRequest,
    pub replaced_by: String,
}

/// Pick up to `max` distinct reviewers uniformly at random.
///
/// Shuffles the index range `0..n` and keeps the first `min(n, max)`
/// entries, so every candidate is equally likely and none is picked twice.
pub fn select_reviewers<R: Rng + ?Sized>(rng: &mut R, candidates: &[User], max: usize) -> Vec<String> {
    let mut indices: Vec<usize> = (0..candidates.len()).collect();
    indices.shuffle(rng);
    indices
        .into_iter()
        .take(max)
        .map(|i| candidates[i].id.clone())
        .collect()
}

/// Pick one replacement reviewer uniformly at random.
pub fn select_replacement<R: Rng + ?Sized>(rng: &mut R, candidates: &[User]) -> Option<String> {
    candidates.choose(rng).map(|user| user.id.clone())
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log::warn!("[engine] {} cancelled", operation);
            Err(AppError::cancelled(format!("{} cancelled", operation)))
        }
        result = fut => result,
    }
}

pub struct ReviewerEngine {
    ledger: Arc<dyn PullRequestLedger>,
    directory: Arc<dyn MembershipDirectory>,
    rng: Mutex<StdRng>,
}

impl ReviewerEngine {
    pub fn new(
        ledger: Arc<dyn PullRequestLedger>,
        directory: Arc<dyn MembershipDirectory>,
        rng: StdRng,
    ) -> Self {
        Self {
            ledger,
            directory,
            rng: Mutex::new(rng),
        }
    }

    /// Engine with a fixed seed; selections are reproducible.
    pub fn with_seed(
        ledger: Arc<dyn PullRequestLedger>,
        directory: Arc<dyn MembershipDirectory>,
        seed: u64,
    ) -> Self {
        Self::new(ledger, directory, StdRng::seed_from_u64(seed))
    }

    /// Engine seeded from OS entropy.
    pub fn from_entropy(
        ledger: Arc<dyn PullRequestLedger>,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Self {
        Self::new(ledger, directory, StdRng::from_entropy())
    }

    /// Run `f` with the PRNG. The guard never crosses an await point.
    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Create an OPEN pull request with up to two reviewers from the author's team.
    ///
    /// An empty candidate pool is not an error: the pull request is created
    /// with no reviewers.
    pub async fn create_pull_request(
        &self,
        cancel: &CancellationToken,
        input: CreatePullRequest,
    ) -> Result<PullRequest, AppError> {
        input.validate()?;

        cancellable(cancel, "create pull request", async {
            let author = self.directory.get_user(&input.author_id).await?;

            log::debug!(
                "[engine] Author {} found in team {}",
                author.id,
                author.team_id
            );

            let candidates = self
                .directory
                .active_members(author.team_id, std::slice::from_ref(&author.id))
                .await?;

            let reviewers =
                self.with_rng(|rng| select_reviewers(rng, &candidates, MAX_INITIAL_REVIEWERS));

            log::info!(
                "[engine] Selected {} reviewer(s) for {} from {} candidate(s): {:?}",
                reviewers.len(),
                input.id,
                candidates.len(),
                reviewers
            );

            let pr = PullRequest {
                id: input.id.clone(),
                name: input.name.clone(),
                author_id: author.id,
                status: PullRequestStatus::Open,
                assigned_reviewers: reviewers,
                created_at: Utc::now(),
                merged_at: None,
            };

            let created = self.ledger.create_with_reviewers(&pr).await?;

            log::info!(
                "[engine] Pull request {} created by {}",
                created.id,
                created.author_id
            );

            Ok(created)
        })
        .await
    }

    /// Mark a pull request MERGED. Idempotent: merging a merged pull request
    /// returns it unchanged.
    pub async fn merge_pull_request(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<PullRequest, AppError> {
        if id.is_empty() {
            return Err(AppError::missing_field("pull_request_id"));
        }

        cancellable(cancel, "merge pull request", async {
            let pr = self.ledger.get(id).await?;
            if pr.is_merged() {
                log::debug!("[engine] Pull request {} already merged", id);
                return Ok(pr);
            }

            match self
                .ledger
                .transition_status(id, PullRequestStatus::Open, PullRequestStatus::Merged, Utc::now())
                .await?
            {
                StatusTransition::Updated => {
                    log::info!("[engine] Pull request {} merged", id);
                }
                StatusTransition::AlreadyInTargetState => {
                    log::debug!("[engine] Pull request {} was merged concurrently", id);
                }
                StatusTransition::NotFound => {
                    return Err(AppError::not_found_with_id("PullRequest", id));
                }
            }

            self.ledger.get(id).await
        })
        .await
    }

    /// Replace `old_reviewer_id` on an OPEN pull request with a random active
    /// member of the old reviewer's team.
    ///
    /// The author and every current reviewer are never eligible.
    pub async fn reassign_reviewer(
        &self,
        cancel: &CancellationToken,
        pull_request_id: &str,
        old_reviewer_id: &str,
    ) -> Result<Reassignment, AppError> {
        if pull_request_id.is_empty() {
            return Err(AppError::missing_field("pull_request_id"));
        }
        if old_reviewer_id.is_empty() {
            return Err(AppError::missing_field("old_user_id"));
        }

        cancellable(cancel, "reassign reviewer", async {
            for attempt in 1..=MAX_REASSIGN_ATTEMPTS {
                let pr = self.ledger.get(pull_request_id).await?;

                if !pr.has_reviewer(old_reviewer_id) {
                    return Err(AppError::not_assigned(pull_request_id, old_reviewer_id));
                }
                if pr.is_merged() {
                    return Err(AppError::pr_merged(pull_request_id));
                }

                let old_reviewer = self.directory.get_user(old_reviewer_id).await?;

                let mut exclude = pr.assigned_reviewers.clone();
                exclude.push(pr.author_id.clone());

                let candidates = self
                    .directory
                    .active_members(old_reviewer.team_id, &exclude)
                    .await?;

                let Some(new_reviewer) = self.with_rng(|rng| select_replacement(rng, &candidates))
                else {
                    log::warn!(
                        "[engine] No replacement for {} on {} in team {}",
                        old_reviewer_id,
                        pull_request_id,
                        old_reviewer.team_id
                    );
                    return Err(AppError::no_candidate(pull_request_id));
                };

                match self
                    .ledger
                    .replace_reviewer(pull_request_id, old_reviewer_id, &new_reviewer)
                    .await?
                {
                    ReplaceOutcome::Replaced(pull_request) => {
                        log::info!(
                            "[engine] Reviewer {} replaced by {} on {}",
                            old_reviewer_id,
                            new_reviewer,
                            pull_request_id
                        );
                        return Ok(Reassignment {
                            pull_request,
                            replaced_by: new_reviewer,
                        });
                    }
                    ReplaceOutcome::NotOpen => {
                        return Err(AppError::pr_merged(pull_request_id));
                    }
                    ReplaceOutcome::NotAssigned => {
                        return Err(AppError::not_assigned(pull_request_id, old_reviewer_id));
                    }
                    ReplaceOutcome::NotFound => {
                        return Err(AppError::not_found_with_id("PullRequest", pull_request_id));
                    }
                    ReplaceOutcome::CandidateTaken => {
                        log::warn!(
                            "[engine] Candidate {} taken concurrently on {} (attempt {}/{})",
                            new_reviewer,
                            pull_request_id,
                            attempt,
                            MAX_REASSIGN_ATTEMPTS
                        );
                    }
                }
            }

            Err(AppError::no_candidate(pull_request_id))
        })
        .await
    }

    /// The ledger this engine writes through.
    pub fn ledger(&self) -> &Arc<dyn PullRequestLedger> {
        &self.ledger
    }
}
