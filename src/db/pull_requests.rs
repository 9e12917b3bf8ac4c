//! Database queries for pull requests and reviewer assignments.
//!
//! Functions that take a `SqliteConnection` are meant to run inside a
//! transaction opened by the caller; see `services::ledger`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use super::pool::DbPool;
use crate::models::{PullRequest, PullRequestShort, PullRequestStatus};

/// Raw `pull_requests` row; status is still the column string.
#[derive(Debug, Clone, FromRow)]
struct PullRequestRow {
    id: String,
    name: String,
    author_id: String,
    status: String,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

fn parse_status(value: &str) -> Result<PullRequestStatus, sqlx::Error> {
    value
        .parse::<PullRequestStatus>()
        .map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Fetch a pull request together with its reviewer set.
pub async fn get_pull_request(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<PullRequest>, sqlx::Error> {
    let row: Option<PullRequestRow> = sqlx::query_as(
        r#"
        SELECT id, name, author_id, status, created_at, merged_at
        FROM pull_requests
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let assigned_reviewers: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM pr_reviewers WHERE pull_request_id = ? ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(PullRequest {
        status: parse_status(&row.status)?,
        id: row.id,
        name: row.name,
        author_id: row.author_id,
        assigned_reviewers,
        created_at: row.created_at,
        merged_at: row.merged_at,
    }))
}

/// Current status of a pull request, if it exists.
pub async fn get_status(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<PullRequestStatus>, sqlx::Error> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM pull_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    status.as_deref().map(parse_status).transpose()
}

/// Insert the pull request row (without reviewers).
pub async fn insert_pull_request(
    conn: &mut SqliteConnection,
    pr: &PullRequest,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pull_requests (id, name, author_id, status, created_at, merged_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&pr.id)
    .bind(&pr.name)
    .bind(&pr.author_id)
    .bind(pr.status.as_str())
    .bind(pr.created_at)
    .bind(pr.merged_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Assign a reviewer.
pub async fn insert_reviewer(
    conn: &mut SqliteConnection,
    pull_request_id: &str,
    user_id: &str,
    assigned_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pr_reviewers (pull_request_id, user_id, assigned_at) VALUES (?, ?, ?)",
    )
    .bind(pull_request_id)
    .bind(user_id)
    .bind(assigned_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Remove a reviewer, but only while the pull request is still OPEN.
///
/// Returns the number of rows removed (0 or 1). Being a write, this also
/// takes the database write lock for the enclosing transaction.
pub async fn delete_reviewer_if_open(
    conn: &mut SqliteConnection,
    pull_request_id: &str,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM pr_reviewers
        WHERE pull_request_id = ?
          AND user_id = ?
          AND EXISTS (
              SELECT 1 FROM pull_requests
              WHERE id = pr_reviewers.pull_request_id AND status = 'OPEN'
          )
        "#,
    )
    .bind(pull_request_id)
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Compare-and-swap on status: applies only while the row is in `from`.
///
/// `merged_at` is written together with the status. Returns the number of
/// rows updated (0 or 1).
pub async fn update_status_if(
    pool: &DbPool,
    id: &str,
    from: PullRequestStatus,
    to: PullRequestStatus,
    merged_at: Option<DateTime<Utc>>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pull_requests SET status = ?, merged_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(merged_at)
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// All pull requests where `user_id` is a reviewer, newest first.
pub async fn list_by_reviewer(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<PullRequestShort>, sqlx::Error> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT pr.id, pr.name, pr.author_id, pr.status
        FROM pull_requests pr
        INNER JOIN pr_reviewers rev ON rev.pull_request_id = pr.id
        WHERE rev.user_id = ?
        ORDER BY pr.created_at DESC, pr.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, name, author_id, status)| {
            Ok(PullRequestShort {
                pull_request_id: id,
                pull_request_name: name,
                author_id,
                status: parse_status(&status)?,
            })
        })
        .collect()
}
