//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A user belonging to exactly one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    /// Caller-assigned, globally unique identifier.
    #[serde(rename = "user_id")]
    pub id: String,

    /// Display name.
    pub username: String,

    /// Owning team (internal, not exposed over the API).
    #[serde(skip)]
    pub team_id: i64,

    /// Name of the owning team.
    pub team_name: String,

    /// Inactive users are never picked as reviewers.
    pub is_active: bool,

    #[serde(skip)]
    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_serialization_hides_internal_fields() {
        let now = Utc::now();
        let user = User {
            id: "u1".to_string(),
            username: "Alice".to_string(),
            team_id: 7,
            team_name: "backend".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user_id": "u1",
                "username": "Alice",
                "team_name": "backend",
                "is_active": true,
            })
        );
    }
}
