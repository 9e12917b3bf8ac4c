//! Team management: create a team with its members, look a team up.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::{Team, TeamMember};

/// Longest accepted team name.
pub const MAX_TEAM_NAME_LEN: usize = 100;

/// Member entry of a team creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTeamMember {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Input for creating a team.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTeam {
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<NewTeamMember>,
}

impl NewTeam {
    /// Validate the request before touching storage.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.team_name.is_empty() {
            return Err(AppError::missing_field("team_name"));
        }
        if self.team_name.chars().count() > MAX_TEAM_NAME_LEN {
            return Err(AppError::invalid_input_field(
                format!("team_name too long (max {} characters)", MAX_TEAM_NAME_LEN),
                "team_name",
            ));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.user_id.is_empty() {
                return Err(AppError::invalid_input_field(
                    "user_id is required for all members",
                    "members",
                ));
            }
            if member.username.is_empty() {
                return Err(AppError::invalid_input_field(
                    "username is required for all members",
                    "members",
                ));
            }
            if !seen.insert(member.user_id.as_str()) {
                return Err(AppError::invalid_input_field(
                    format!("duplicate user_id in request: {}", member.user_id),
                    "members",
                ));
            }
        }

        Ok(())
    }
}

/// Create a team and upsert its members in one transaction.
///
/// Existing users are moved into the new team, since a user belongs to
/// exactly one team.
pub async fn create_team(pool: &DbPool, input: NewTeam) -> Result<Team, AppError> {
    input.validate()?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let team_id = match db::teams::insert_team(&mut tx, &input.team_name, now).await {
        Ok(id) => id,
        Err(e) if db::is_unique_violation(&e) => {
            return Err(AppError::team_exists(&input.team_name));
        }
        Err(e) => {
            log::error!("[teams] Failed to create team {}: {}", input.team_name, e);
            return Err(AppError::database_with_op(e.to_string(), "create team"));
        }
    };

    for member in &input.members {
        db::users::upsert_user(
            &mut tx,
            &member.user_id,
            &member.username,
            team_id,
            member.is_active,
            now,
        )
        .await
        .map_err(|e| {
            log::error!("[teams] Failed to upsert user {}: {}", member.user_id, e);
            AppError::database_with_op(e.to_string(), "upsert user")
        })?;
    }

    let members = db::users::list_team_members(&mut tx, team_id).await?;
    tx.commit().await?;

    log::info!(
        "[teams] Team {} created (id {}) with {} member(s)",
        input.team_name,
        team_id,
        members.len()
    );

    Ok(Team {
        id: team_id,
        name: input.team_name,
        members: members.into_iter().map(TeamMember::from).collect(),
        created_at: now,
    })
}

/// Fetch a team with its members by name.
pub async fn get_team(pool: &DbPool, team_name: &str) -> Result<Team, AppError> {
    if team_name.is_empty() {
        return Err(AppError::missing_field("team_name"));
    }

    let mut tx = pool.begin().await?;

    let row = db::teams::get_team_by_name(&mut tx, team_name)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Team", team_name))?;
    let members = db::users::list_team_members(&mut tx, row.id).await?;

    tx.commit().await?;

    Ok(Team {
        id: row.id,
        name: row.name,
        members: members.into_iter().map(TeamMember::from).collect(),
        created_at: row.created_at,
    })
}
