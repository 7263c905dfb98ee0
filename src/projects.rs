//! Project lifecycle and the read models the presentation layer renders.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseTransaction, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::Actor;
use crate::entities::{fund_unlock_request, milestone, project, ProjectStatus};
use crate::error::AppError;
use crate::gate::{self, FundingPolicy, GateDecision};
use crate::ledger;
use crate::proofs::{self, ProofRequirement};
use crate::unlock;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewProject {
    pub title: String,
    /// Funding goal in minor currency units
    pub funding_goal: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectOverview {
    pub project: project::Model,
    pub milestones: Vec<milestone::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FundingStats {
    pub project_id: Uuid,
    pub funding_goal: i64,
    pub raised: i64,
    pub percent_funded: f64,
    pub investor_count: u64,
    /// Gate is eligible and no request is already pending.
    pub can_request_unlock: bool,
    pub gate: GateDecision,
    pub has_pending_request: bool,
    pub pending_request: Option<fund_unlock_request::Model>,
    pub next_milestone: Option<milestone::Model>,
    pub needs_proof: Option<ProofRequirement>,
}

#[tracing::instrument(skip_all, fields(artist = %actor.id))]
pub async fn create_project<C: ConnectionTrait>(
    conn: &C,
    actor: &Actor,
    new_project: NewProject,
) -> Result<project::Model, AppError> {
    actor.require_artist()?;

    let title = new_project.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("project title is required".to_string()));
    }
    if new_project.funding_goal <= 0 {
        return Err(AppError::Validation(
            "funding goal must be greater than zero".to_string(),
        ));
    }

    let now = Utc::now();
    let project = project::ActiveModel {
        id: Set(Uuid::new_v4()),
        artist_id: Set(actor.id.clone()),
        title: Set(title.to_string()),
        funding_goal: Set(new_project.funding_goal),
        raised: Set(0),
        status: Set(ProjectStatus::Draft),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    tracing::info!(project_id = %project.id, "project created");
    Ok(project)
}

#[tracing::instrument(
    skip_all,
    fields(project_id = %project_id, admin = %actor.id, action = ?action)
)]
pub async fn review_project(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    project_id: Uuid,
    actor: &Actor,
    action: ReviewAction,
) -> Result<project::Model, AppError> {
    actor.require_admin()?;

    let project = aggregate::lock_project(txn, project_id).await?;
    if project.status != ProjectStatus::Draft {
        return Err(AppError::Conflict(format!(
            "project {} was already reviewed (status: {:?})",
            project_id, project.status
        )));
    }

    let status = match action {
        ReviewAction::Approve => {
            let state = ProjectState::load(txn, project.clone()).await?;
            if state.milestones.is_empty() {
                return Err(AppError::Validation(
                    "a milestone schedule must be published before approval".to_string(),
                ));
            }
            ProjectStatus::Active
        }
        ReviewAction::Reject => ProjectStatus::Rejected,
    };

    let mut active: project::ActiveModel = project.into();
    active.status = Set(status);
    let project = active.update(txn).await?;

    let state = ProjectState::load(txn, project.clone()).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    tracing::info!(status = ?project.status, "project reviewed");
    Ok(project)
}

pub async fn project_overview<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<ProjectOverview, AppError> {
    let project = aggregate::find_project(conn, project_id).await?;
    let state = ProjectState::load(conn, project).await?;
    Ok(ProjectOverview {
        project: state.project,
        milestones: state.milestones,
    })
}

pub async fn funding_stats<C: ConnectionTrait>(
    conn: &C,
    policy: &FundingPolicy,
    project_id: Uuid,
) -> Result<FundingStats, AppError> {
    let project = aggregate::find_project(conn, project_id).await?;
    let state = ProjectState::load(conn, project).await?;
    let investor_count = ledger::investor_count(conn, project_id).await?;
    let pending_request = unlock::pending_request_for(conn, project_id).await?;

    let decision = gate::can_request_unlock(policy, &state);
    let has_pending_request = pending_request.is_some();

    Ok(FundingStats {
        project_id,
        funding_goal: state.project.funding_goal,
        raised: state.project.raised,
        percent_funded: gate::percent_funded(state.project.raised, state.project.funding_goal),
        investor_count,
        can_request_unlock: decision.is_eligible() && !has_pending_request,
        has_pending_request,
        pending_request,
        next_milestone: state.next_pending().cloned(),
        needs_proof: proofs::proof_requirement(&state),
        gate: decision,
    })
}
