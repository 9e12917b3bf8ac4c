//! Application error types.
//!
//! Every failure the reviewer-assignment service can report is one of these
//! variants. Each variant carries a stable API code (see [`AppError::code`])
//! that callers rely on; storage failures are folded into `Database` at the
//! db boundary and never leak their driver-specific details to clients.

use thiserror::Error;

/// Application-level errors.
///
/// The HTTP layer renders them through the `{"error":{code,message}}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing caller data.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// Referenced entity does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        id: Option<String>,
    },

    /// A team with this name already exists.
    #[error("Team already exists: {name}")]
    TeamExists { name: String },

    /// A pull request with this id already exists.
    #[error("Pull request already exists: {id}")]
    PrExists { id: String },

    /// The pull request is merged and can no longer be modified.
    #[error("Cannot modify merged pull request: {id}")]
    PrMerged { id: String },

    /// The user is not a reviewer of the pull request.
    #[error("Reviewer {user_id} is not assigned to pull request {pull_request_id}")]
    NotAssigned {
        pull_request_id: String,
        user_id: String,
    },

    /// No eligible replacement reviewer is available.
    #[error("No candidate available for reassignment on pull request {pull_request_id}")]
    NoCandidate { pull_request_id: String },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        operation: Option<String>,
    },

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Shorthand for the "`field` is required" case.
    pub fn missing_field(field: &str) -> Self {
        Self::invalid_input_field(format!("{} is required", field), field)
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    pub fn team_exists(name: impl Into<String>) -> Self {
        Self::TeamExists { name: name.into() }
    }

    pub fn pr_exists(id: impl Into<String>) -> Self {
        Self::PrExists { id: id.into() }
    }

    pub fn pr_merged(id: impl Into<String>) -> Self {
        Self::PrMerged { id: id.into() }
    }

    pub fn not_assigned(pull_request_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotAssigned {
            pull_request_id: pull_request_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn no_candidate(pull_request_id: impl Into<String>) -> Self {
        Self::NoCandidate {
            pull_request_id: pull_request_id.into(),
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable API code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::TeamExists { .. } => "TEAM_EXISTS",
            Self::PrExists { .. } => "PR_EXISTS",
            Self::PrMerged { .. } => "PR_MERGED",
            Self::NotAssigned { .. } => "NOT_ASSIGNED",
            Self::NoCandidate { .. } => "NO_CANDIDATE",
            Self::Database { .. } | Self::Cancelled { .. } | Self::Internal { .. } => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Whether the error belongs to the caller-visible taxonomy.
    ///
    /// Non-client errors are logged server-side and answered with a generic
    /// message.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Database { .. } | Self::Cancelled { .. } | Self::Internal { .. }
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            operation: None,
        }
    }
}
