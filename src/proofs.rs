//! Proof-of-completion tracking for released milestones.
//!
//! After milestone *k* is released the artist submits evidence of how the
//! funds were used; milestone *k+1* stays locked until an admin approves it.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::Actor;
use crate::entities::{milestone, milestone_proof, MilestoneProof, ProofStatus};
use crate::error::AppError;
use crate::gate::{self, FundingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProofDecision {
    Approve,
    Reject,
}

/// The released milestone whose proof gates the next unlock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProofRequirement {
    pub milestone: milestone::Model,
    /// Status of the latest submission, `None` if nothing was submitted yet.
    pub latest_proof_status: Option<ProofStatus>,
}

pub fn proof_requirement(state: &ProjectState) -> Option<ProofRequirement> {
    // Nothing further to unlock means nothing to prove for.
    state.next_pending()?;
    let released = state.last_released()?;
    if state.has_approved_proof(released.id) {
        return None;
    }
    Some(ProofRequirement {
        milestone: released.clone(),
        latest_proof_status: state.latest_proof(released.id).map(|p| p.status),
    })
}

#[tracing::instrument(skip_all, fields(project_id = %project_id, milestone_id = %milestone_id))]
pub async fn submit_proof(
    txn: &DatabaseTransaction,
    project_id: Uuid,
    milestone_id: Uuid,
    actor: &Actor,
    description: &str,
    file_ref: &str,
) -> Result<milestone_proof::Model, AppError> {
    if description.trim().is_empty() {
        return Err(AppError::Validation("proof description is required".to_string()));
    }
    if file_ref.trim().is_empty() {
        return Err(AppError::Validation("proof file reference is required".to_string()));
    }

    let project = aggregate::lock_project(txn, project_id).await?;
    actor.require_owner(&project)?;

    let state = ProjectState::load(txn, project).await?;
    let target = state
        .milestone(milestone_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "milestone {} in project {}",
                milestone_id, project_id
            ))
        })?;

    match state.last_released() {
        Some(released) if released.id == target.id => {}
        Some(released) => {
            return Err(AppError::Sequence(format!(
                "proof can only be submitted for the most recently released milestone ({})",
                released.position
            )))
        }
        None => {
            return Err(AppError::Sequence(format!(
                "milestone {} has not been released yet",
                target.position
            )))
        }
    }

    let blocking = state.proofs.iter().find(|p| {
        p.milestone_id == milestone_id
            && matches!(p.status, ProofStatus::Pending | ProofStatus::Approved)
    });
    if let Some(existing) = blocking {
        return Err(AppError::Sequence(format!(
            "milestone {} already has a {:?} proof",
            target.position, existing.status
        )));
    }

    let proof = milestone_proof::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        milestone_id: Set(milestone_id),
        description: Set(description.trim().to_string()),
        file_ref: Set(file_ref.trim().to_string()),
        status: Set(ProofStatus::Pending),
        admin_id: Set(None),
        admin_response: Set(None),
        created_at: Set(Utc::now()),
        reviewed_at: Set(None),
    }
    .insert(txn)
    .await?;

    tracing::info!(proof_id = %proof.id, "proof submitted");
    Ok(proof)
}

#[tracing::instrument(skip_all, fields(proof_id = %proof_id, decision = ?decision))]
pub async fn resolve_proof(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    proof_id: Uuid,
    actor: &Actor,
    decision: ProofDecision,
    admin_response: Option<String>,
) -> Result<milestone_proof::Model, AppError> {
    actor.require_admin()?;

    let proof = MilestoneProof::find_by_id(proof_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("proof {}", proof_id)))?;

    let project = aggregate::lock_project(txn, proof.project_id).await?;

    // Re-read under the aggregate claim; a concurrent review may have won.
    let proof = MilestoneProof::find_by_id(proof_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("proof {}", proof_id)))?;
    if proof.status != ProofStatus::Pending {
        return Err(AppError::Conflict(format!(
            "proof {} was already {:?}",
            proof_id, proof.status
        )));
    }

    let mut active: milestone_proof::ActiveModel = proof.into();
    active.status = Set(match decision {
        ProofDecision::Approve => ProofStatus::Approved,
        ProofDecision::Reject => ProofStatus::Rejected,
    });
    active.admin_id = Set(Some(actor.id.clone()));
    active.admin_response = Set(admin_response);
    active.reviewed_at = Set(Some(Utc::now()));
    let proof = active.update(txn).await?;

    let state = ProjectState::load(txn, project).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    tracing::info!(status = ?proof.status, "proof reviewed");
    Ok(proof)
}

pub async fn needs_proof_for_milestone<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Option<ProofRequirement>, AppError> {
    let project = aggregate::find_project(conn, project_id).await?;
    let state = ProjectState::load(conn, project).await?;
    Ok(proof_requirement(&state))
}

pub async fn list_proofs<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Vec<milestone_proof::Model>, AppError> {
    Ok(MilestoneProof::find()
        .filter(milestone_proof::Column::ProjectId.eq(project_id))
        .order_by_asc(milestone_proof::Column::CreatedAt)
        .all(conn)
        .await?)
}
