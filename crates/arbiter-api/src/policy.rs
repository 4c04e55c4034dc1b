//! # Role-Based Access Policy
//!
//! Maps actors to roles and roles to the workflow actions they may perform.
//! The table is read from `ACTOR_ROLES` (`actor=role,actor=role`).
//!
//! | Role | Permitted actions |
//! |---|---|
//! | `oracle` | `create_resolution` |
//! | `participant` | `create_dispute` |
//! | `reviewer` | `review_dispute`, `confirm_resolution` |
//! | `settlement` | `confirm_resolution`, `finalize_resolution` |
//! | `admin` | everything |
//!
//! Actors missing from the table fall back to the default role, if one is
//! set, and are denied otherwise.

use std::collections::HashMap;

use arbiter_core::{ActorRef, ResolutionId};
use arbiter_state::{AccessPolicy, Action, PortError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A caller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Oracle,
    Participant,
    Reviewer,
    Settlement,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Participant => "participant",
            Self::Reviewer => "reviewer",
            Self::Settlement => "settlement",
            Self::Admin => "admin",
        }
    }

    /// Whether this role may perform `action`.
    pub fn permits(&self, action: Action) -> bool {
        match self {
            Self::Admin => true,
            Self::Oracle => matches!(action, Action::CreateResolution),
            Self::Participant => matches!(action, Action::CreateDispute),
            Self::Reviewer => matches!(
                action,
                Action::ReviewDispute | Action::ConfirmResolution
            ),
            Self::Settlement => matches!(
                action,
                Action::ConfirmResolution | Action::FinalizeResolution
            ),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "oracle" => Ok(Self::Oracle),
            "participant" => Ok(Self::Participant),
            "reviewer" => Ok(Self::Reviewer),
            "settlement" => Ok(Self::Settlement),
            "admin" => Ok(Self::Admin),
            other => Err(RoleTableError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed `ACTOR_ROLES` value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleTableError {
    #[error("entry {0:?} is not of the form actor=role")]
    MalformedEntry(String),
    #[error("unknown role {0:?}")]
    UnknownRole(String),
    #[error("invalid actor in {entry:?}: {reason}")]
    InvalidActor { entry: String, reason: String },
    #[error("actor {0} is listed more than once")]
    DuplicateActor(String),
}

/// Parse `actor=role,actor=role`. Blank entries are ignored.
pub fn parse_role_table(raw: &str) -> Result<HashMap<ActorRef, Role>, RoleTableError> {
    let mut table = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (actor, role) = entry
            .split_once('=')
            .ok_or_else(|| RoleTableError::MalformedEntry(entry.to_string()))?;
        let actor = ActorRef::new(actor).map_err(|e| RoleTableError::InvalidActor {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
        let role: Role = role.parse()?;
        if table.insert(actor.clone(), role).is_some() {
            return Err(RoleTableError::DuplicateActor(actor.to_string()));
        }
    }
    Ok(table)
}

/// [`AccessPolicy`] backed by a static actor → role table.
#[derive(Debug, Clone, Default)]
pub struct RoleAccessPolicy {
    roles: HashMap<ActorRef, Role>,
    default_role: Option<Role>,
}

impl RoleAccessPolicy {
    /// Only actors in the table are recognized.
    pub fn new(roles: HashMap<ActorRef, Role>) -> Self {
        Self {
            roles,
            default_role: None,
        }
    }

    /// Every actor is treated as `admin`. For deployments without a role table.
    pub fn permissive() -> Self {
        Self {
            roles: HashMap::new(),
            default_role: Some(Role::Admin),
        }
    }

    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = Some(role);
        self
    }

    pub fn role_of(&self, actor: &ActorRef) -> Option<Role> {
        self.roles.get(actor).copied().or(self.default_role)
    }
}

#[async_trait]
impl AccessPolicy for RoleAccessPolicy {
    async fn can_perform(
        &self,
        actor: &ActorRef,
        action: Action,
        resolution_id: Option<ResolutionId>,
    ) -> Result<bool, PortError> {
        let allowed = self.role_of(actor).is_some_and(|role| role.permits(action));
        if !allowed {
            tracing::debug!(
                actor = %actor,
                action = %action,
                resolution_id = ?resolution_id.map(|id| id.to_string()),
                role = ?self.role_of(actor).map(|r| r.as_str()),
                "access denied by role table"
            );
        }
        Ok(allowed)
    }
}
