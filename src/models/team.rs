//! Team model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::User;

/// A named team and its members.
#[derive(Debug, Clone, Serialize)]
pub struct Team {
    /// Store-assigned identifier.
    #[serde(skip)]
    pub id: i64,

    /// Unique team name.
    #[serde(rename = "team_name")]
    pub name: String,

    /// Members in no particular order.
    pub members: Vec<TeamMember>,

    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

/// Team member as shown inside a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

impl From<User> for TeamMember {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            is_active: user.is_active,
        }
    }
}

impl Team {
    /// Look up a member by id.
    pub fn member(&self, user_id: &str) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}
