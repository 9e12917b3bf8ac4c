//! REST API routes for the reviewer-assignment service.
//!
//! Handlers decode the request, run the matching service operation under a
//! per-request deadline and render the result. Every failure goes through
//! [`ApiErr`], so error bodies always have the `{"error":{code,message}}`
//! shape.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::db::pool::{self, DbPool};
use crate::error::AppError;
use crate::models::{PullRequest, PullRequestShort, Team, User};
use crate::services::engine::{CreatePullRequest, Reassignment, ReviewerEngine};
use crate::services::{teams, users};

/// How long the health check waits for the database.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for the axum routes.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub engine: Arc<ReviewerEngine>,
    /// Parent of every per-request cancellation token.
    pub cancel: CancellationToken,
    pub request_timeout: Duration,
}

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(AppError);

impl ApiErr {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::InvalidInput { .. } | AppError::TeamExists { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::PrExists { .. }
            | AppError::PrMerged { .. }
            | AppError::NotAssigned { .. }
            | AppError::NoCandidate { .. } => StatusCode::CONFLICT,
            AppError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the server log.
        let message = if self.0.is_client_error() {
            log::debug!("[api] Request rejected: {}", self.0);
            self.0.to_string()
        } else {
            log::error!("[api] Request failed: {}", self.0);
            "internal server error".to_string()
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail {
                    code: self.0.code(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self(AppError::invalid_input(format!(
            "invalid JSON: {}",
            rejection.body_text()
        )))
    }
}

impl From<QueryRejection> for ApiErr {
    fn from(rejection: QueryRejection) -> Self {
        Self(AppError::invalid_input(rejection.body_text()))
    }
}

/// Run `op` with a cancellation token that fires when the request deadline
/// elapses or the server aborts outstanding work.
async fn with_deadline<T, F, Fut>(state: &AppState, op: F) -> Result<T, AppError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let cancel = state.cancel.child_token();
    match tokio::time::timeout(state.request_timeout, op(cancel.clone())).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            log::warn!(
                "[api] Request exceeded deadline of {:?}",
                state.request_timeout
            );
            Err(AppError::cancelled(format!(
                "request deadline of {:?} elapsed",
                state.request_timeout
            )))
        }
    }
}

// ── Request / response bodies ────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreatePullRequestBody {
    #[serde(default)]
    pull_request_id: String,
    #[serde(default)]
    pull_request_name: String,
    #[serde(default)]
    author_id: String,
}

#[derive(Deserialize)]
struct MergePullRequestBody {
    #[serde(default)]
    pull_request_id: String,
}

#[derive(Deserialize)]
struct ReassignBody {
    #[serde(default)]
    pull_request_id: String,
    #[serde(default)]
    old_user_id: String,
}

#[derive(Deserialize)]
struct SetIsActiveBody {
    #[serde(default)]
    user_id: String,
    is_active: Option<bool>,
}

#[derive(Deserialize)]
struct TeamQuery {
    #[serde(default)]
    team_name: String,
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: String,
}

#[derive(Serialize)]
struct PullRequestResponse {
    pull_request: PullRequest,
}

#[derive(Serialize)]
struct TeamResponse {
    team: Team,
}

#[derive(Serialize)]
struct UserResponse {
    user: User,
}

#[derive(Serialize)]
struct UserReviewsResponse {
    user_id: String,
    pull_requests: Vec<PullRequestShort>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

// ── Route builder ────────────────────────────────────────────────────────────

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_is_active))
        .route("/users/getReview", get(get_review))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /health: database connectivity.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, pool::ping(&state.db)).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "connected",
            }),
        ),
        Ok(Err(e)) => {
            log::error!("[api] Database health check failed: {}", e);
            unhealthy()
        }
        Err(_) => {
            log::error!("[api] Database health check timed out");
            unhealthy()
        }
    }
}

fn unhealthy() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "error",
            database: "disconnected",
        }),
    )
}

/// POST /team/add: create a team with its members.
async fn add_team(
    State(state): State<AppState>,
    payload: Result<Json<teams::NewTeam>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiErr> {
    let Json(input) = payload?;
    let db = state.db.clone();

    let team = with_deadline(&state, |_| async move { teams::create_team(&db, input).await }).await?;

    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

/// GET /team/get?team_name=X: fetch a team.
async fn get_team(
    State(state): State<AppState>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamResponse>, ApiErr> {
    let Query(params) = query?;
    let db = state.db.clone();

    let team = with_deadline(&state, |_| async move {
        teams::get_team(&db, &params.team_name).await
    })
    .await?;

    Ok(Json(TeamResponse { team }))
}

/// POST /users/setIsActive: flip a user's active flag.
async fn set_is_active(
    State(state): State<AppState>,
    payload: Result<Json<SetIsActiveBody>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiErr> {
    let Json(body) = payload?;
    let is_active = body
        .is_active
        .ok_or_else(|| AppError::missing_field("is_active"))?;
    let db = state.db.clone();

    let user = with_deadline(&state, |_| async move {
        users::set_is_active(&db, &body.user_id, is_active).await
    })
    .await?;

    Ok(Json(UserResponse { user }))
}

/// GET /users/getReview?user_id=X: pull requests a user reviews.
async fn get_review(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UserReviewsResponse>, ApiErr> {
    let Query(params) = query?;
    let engine = state.engine.clone();
    let user_id = params.user_id.clone();

    let pull_requests = with_deadline(&state, |_| async move {
        users::get_reviews(&**engine.ledger(), &user_id).await
    })
    .await?;

    Ok(Json(UserReviewsResponse {
        user_id: params.user_id,
        pull_requests,
    }))
}

/// POST /pullRequest/create: create a pull request and assign reviewers.
async fn create_pull_request(
    State(state): State<AppState>,
    payload: Result<Json<CreatePullRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequestResponse>), ApiErr> {
    let Json(body) = payload?;
    let engine = state.engine.clone();
    let input = CreatePullRequest {
        id: body.pull_request_id,
        name: body.pull_request_name,
        author_id: body.author_id,
    };

    let pull_request = with_deadline(&state, |cancel| async move {
        engine.create_pull_request(&cancel, input).await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(PullRequestResponse { pull_request })))
}

/// POST /pullRequest/merge: mark a pull request merged (idempotent).
async fn merge_pull_request(
    State(state): State<AppState>,
    payload: Result<Json<MergePullRequestBody>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiErr> {
    let Json(body) = payload?;
    let engine = state.engine.clone();

    let pull_request = with_deadline(&state, |cancel| async move {
        engine
            .merge_pull_request(&cancel, &body.pull_request_id)
            .await
    })
    .await?;

    Ok(Json(PullRequestResponse { pull_request }))
}

/// POST /pullRequest/reassign: replace one reviewer.
async fn reassign_reviewer(
    State(state): State<AppState>,
    payload: Result<Json<ReassignBody>, JsonRejection>,
) -> Result<Json<Reassignment>, ApiErr> {
    let Json(body) = payload?;
    let engine = state.engine.clone();

    let reassignment = with_deadline(&state, |cancel| async move {
        engine
            .reassign_reviewer(&cancel, &body.pull_request_id, &body.old_user_id)
            .await
    })
    .await?;

    Ok(Json(reassignment))
}
