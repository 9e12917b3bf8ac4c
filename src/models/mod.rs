//! Data models for the application.
//!
//! These models represent the entities stored in the SQLite database and
//! returned over the HTTP API. JSON field names follow the public API
//! contract (`pull_request_id`, `team_name`, ...), not the column names.

pub mod pull_request;
pub mod team;
pub mod user;

// Re-exports for convenient access
pub use pull_request::{PullRequest, PullRequestShort, PullRequestStatus};
pub use team::{Team, TeamMember};
pub use user::User;
