//! Admin decisions on pending unlock requests.
//!
//! Approval calls the escrow processor while the decision transaction is
//! still open, so the project's version claim (and on SQLite the database
//! write lock) is held for the duration of the release. That duration is
//! capped by [`EscrowRetryPolicy::deadline`], which configuration keeps
//! below the pool's acquire timeout.
//!
//! If the release succeeds but the commit then fails, the request is left
//! pending with no receipt. Approving it again sends the same
//! [`ReleaseInstruction::idempotency_key`] (the request id), so the
//! processor returns the original receipt instead of moving funds twice.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::Actor;
use crate::entities::{
    fund_unlock_request, milestone, project, FundUnlockRequest, MilestoneStatus, ProjectStatus,
    RequestStatus,
};
use crate::error::AppError;
use crate::escrow::{self, EscrowGateway, EscrowRetryPolicy, ReleaseInstruction};
use crate::gate::{self, FundingPolicy, GateDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

/// Applies an admin decision. Every write, including the escrow release,
/// happens inside `txn`; if the release fails the caller drops the
/// transaction and the request is still pending.
///
/// Approval re-evaluates the funding gate against the current ledger, so a
/// request that was eligible when filed is refused if it no longer is.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(
    skip_all,
    fields(request_id = %request_id, admin = %actor.id, action = ?action)
)]
pub async fn decide(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    escrow_gateway: &dyn EscrowGateway,
    retry: &EscrowRetryPolicy,
    request_id: Uuid,
    actor: &Actor,
    action: DecisionAction,
    note: Option<String>,
) -> Result<fund_unlock_request::Model, AppError> {
    actor.require_admin()?;

    let request = find_request(txn, request_id).await?;
    let project = aggregate::lock_project(txn, request.project_id).await?;

    // Re-read under the aggregate claim so a duplicate decision sees the first.
    let request = find_request(txn, request_id).await?;
    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict(format!(
            "unlock request {} was already {:?}",
            request_id, request.status
        )));
    }

    let state = ProjectState::load(txn, project).await?;
    let target = state
        .milestone(request.milestone_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("milestone {}", request.milestone_id)))?;

    let now = Utc::now();
    let mut active: fund_unlock_request::ActiveModel = request.clone().into();
    active.responded_at = Set(Some(now));
    active.admin_id = Set(Some(actor.id.clone()));
    active.admin_response = Set(note);

    let request = match action {
        DecisionAction::Reject => {
            active.status = Set(RequestStatus::Rejected);
            let request = active.update(txn).await?;

            // Hand the milestone back to the gate.
            let mut m: milestone::ActiveModel = target.into();
            m.status = Set(MilestoneStatus::Locked);
            m.update(txn).await?;

            tracing::info!("unlock request rejected");
            request
        }
        DecisionAction::Approve => {
            match gate::can_request_unlock(policy, &state) {
                GateDecision::Eligible { milestone, .. } if milestone.id == target.id => {}
                GateDecision::Eligible { .. } => {
                    return Err(AppError::Conflict(format!(
                        "milestone {} is not the next milestone due for release",
                        target.position
                    )));
                }
                GateDecision::NotEligible { reason } => {
                    tracing::warn!(%reason, "unlock request no longer passes the funding gate");
                    return Err(AppError::NotEligible(reason));
                }
            }

            active.status = Set(RequestStatus::Approved);
            active.update(txn).await?;

            let mut m: milestone::ActiveModel = target.clone().into();
            m.status = Set(MilestoneStatus::Released);
            m.released_at = Set(Some(now));
            m.update(txn).await?;

            let remaining = state
                .milestones
                .iter()
                .filter(|m| !m.is_released() && m.id != target.id)
                .count();
            if remaining == 0 {
                let mut p: project::ActiveModel = state.project.clone().into();
                p.status = Set(ProjectStatus::Completed);
                p.update(txn).await?;
            }

            let instruction = ReleaseInstruction {
                idempotency_key: request.id,
                project_id: request.project_id,
                milestone_id: target.id,
                amount: target.amount,
            };
            let receipt = escrow::release_with_retry(escrow_gateway, &instruction, retry)
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "escrow release failed; decision rolled back");
                    AppError::ReleaseFailed(err.to_string())
                })?;

            let mut approved: fund_unlock_request::ActiveModel =
                find_request(txn, request_id).await?.into();
            approved.escrow_receipt = Set(Some(receipt.0));
            let request = approved.update(txn).await?;

            tracing::info!(
                milestone = target.position,
                amount = target.amount,
                completed = remaining == 0,
                "unlock request approved and funds released"
            );
            request
        }
    };

    let project = aggregate::find_project(txn, request.project_id).await?;
    let state = ProjectState::load(txn, project).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    Ok(request)
}

async fn find_request(
    txn: &DatabaseTransaction,
    request_id: Uuid,
) -> Result<fund_unlock_request::Model, AppError> {
    FundUnlockRequest::find_by_id(request_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("unlock request {}", request_id)))
}
