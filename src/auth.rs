//! Caller identity as supplied by the upstream identity gateway.
//!
//! Authentication happens before requests reach this service; the gateway
//! forwards the verified subject and role in `x-actor-id` / `x-actor-role`.

use std::fmt;
use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::project;
use crate::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Artist,
    Admin,
    Investor,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(Role::Artist),
            "admin" => Ok(Role::Admin),
            "investor" => Ok(Role::Investor),
            other => Err(AppError::Unauthorized(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Artist => "artist",
            Role::Admin => "admin",
            Role::Investor => "investor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn artist(id: impl Into<String>) -> Self {
        Self::new(id, Role::Artist)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn investor(id: impl Into<String>) -> Self {
        Self::new(id, Role::Investor)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} '{}' is not an admin",
                self.role, self.id
            )))
        }
    }

    pub fn require_artist(&self) -> Result<(), AppError> {
        if self.role == Role::Artist {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} '{}' is not an artist",
                self.role, self.id
            )))
        }
    }

    /// The caller must be the artist who owns `project`.
    pub fn require_owner(&self, project: &project::Model) -> Result<(), AppError> {
        if self.role == Role::Artist && self.id == project.artist_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "'{}' does not own project {}",
                self.id, project.id
            )))
        }
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ACTOR_ID_HEADER)))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ACTOR_ROLE_HEADER)))?
            .parse::<Role>()?;

        Ok(Actor { id, role })
    }
}
