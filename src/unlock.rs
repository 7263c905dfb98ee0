//! Unlock request workflow.
//!
//! Per project: `NoRequest -> Pending -> {Approved, Rejected}`, with
//! `Rejected` returning to `NoRequest`. At most one request is pending at a
//! time; the existence check and the insert share the aggregate claim.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::Actor;
use crate::entities::{
    fund_unlock_request, milestone, FundUnlockRequest, MilestoneStatus, RequestStatus,
};
use crate::error::AppError;
use crate::gate::{self, FundingPolicy, GateDecision};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnlockRequestReceipt {
    pub request: fund_unlock_request::Model,
    pub milestone_name: String,
    pub milestone_position: i32,
    pub amount: i64,
}

#[tracing::instrument(skip_all, fields(project_id = %project_id, artist = %actor.id))]
pub async fn request_unlock(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    project_id: Uuid,
    actor: &Actor,
) -> Result<UnlockRequestReceipt, AppError> {
    let project = aggregate::find_project(txn, project_id).await?;
    actor.require_owner(&project)?;

    let project = aggregate::lock_project(txn, project_id).await?;

    if let Some(existing) = pending_request_for(txn, project_id).await? {
        return Err(AppError::Conflict(format!(
            "unlock request {} is already pending for this project",
            existing.id
        )));
    }

    let state = ProjectState::load(txn, project).await?;
    let target = match gate::can_request_unlock(policy, &state) {
        GateDecision::Eligible { milestone, .. } => milestone,
        GateDecision::NotEligible { reason } => {
            tracing::info!(%reason, "unlock request refused by funding gate");
            return Err(AppError::NotEligible(reason));
        }
    };

    let request = fund_unlock_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        milestone_id: Set(target.id),
        artist_id: Set(actor.id.clone()),
        requested_at: Set(Utc::now()),
        status: Set(RequestStatus::Pending),
        responded_at: Set(None),
        admin_id: Set(None),
        admin_response: Set(None),
        escrow_receipt: Set(None),
    }
    .insert(txn)
    .await?;

    let mut active: milestone::ActiveModel = target.clone().into();
    active.status = Set(MilestoneStatus::UnlockRequested);
    active.update(txn).await?;

    tracing::info!(
        request_id = %request.id,
        milestone = target.position,
        amount = target.amount,
        "unlock requested"
    );
    Ok(UnlockRequestReceipt {
        request,
        milestone_name: target.name,
        milestone_position: target.position,
        amount: target.amount,
    })
}

pub async fn pending_request_for<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Option<fund_unlock_request::Model>, AppError> {
    Ok(FundUnlockRequest::find()
        .filter(fund_unlock_request::Column::ProjectId.eq(project_id))
        .filter(fund_unlock_request::Column::Status.eq(RequestStatus::Pending))
        .one(conn)
        .await?)
}

pub async fn list_unlock_requests<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Vec<fund_unlock_request::Model>, AppError> {
    Ok(FundUnlockRequest::find()
        .filter(fund_unlock_request::Column::ProjectId.eq(project_id))
        .order_by_asc(fund_unlock_request::Column::RequestedAt)
        .all(conn)
        .await?)
}

/// Admin queue, oldest first.
pub async fn pending_unlock_requests<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<fund_unlock_request::Model>, AppError> {
    Ok(FundUnlockRequest::find()
        .filter(fund_unlock_request::Column::Status.eq(RequestStatus::Pending))
        .order_by_asc(fund_unlock_request::Column::RequestedAt)
        .all(conn)
        .await?)
}
