//! Append-only investment ledger.
//!
//! Entries are inserted, never updated or deleted. The project's `raised`
//! column is the running aggregate and is written in the same transaction
//! as every entry, together with the gate recomputation.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::{Actor, Role};
use crate::entities::{investment, project, Investment, InvestmentStatus, ProjectStatus};
use crate::error::AppError;
use crate::gate::{self, FundingPolicy};
use crate::unlock;

/// Net amount of a set of ledger entries: active minus cancelled.
pub fn ledger_total(entries: &[investment::Model]) -> i64 {
    entries
        .iter()
        .map(|e| match e.status {
            InvestmentStatus::Active => e.amount,
            InvestmentStatus::Cancelled => -e.amount,
        })
        .sum()
}

/// Distinct investors holding at least one active, uncancelled entry.
pub fn distinct_investors(entries: &[investment::Model]) -> u64 {
    let reversed: HashSet<Uuid> = entries.iter().filter_map(|e| e.reverses_id).collect();
    entries
        .iter()
        .filter(|e| e.status == InvestmentStatus::Active && !reversed.contains(&e.id))
        .map(|e| e.investor_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}

#[tracing::instrument(
    skip_all,
    fields(project_id = %project_id, investor_id = %investor_id, amount = %amount)
)]
pub async fn record_investment(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    project_id: Uuid,
    investor_id: &str,
    amount: i64,
) -> Result<investment::Model, AppError> {
    if amount <= 0 {
        return Err(AppError::Validation(
            "investment amount must be greater than zero".to_string(),
        ));
    }
    if investor_id.trim().is_empty() {
        return Err(AppError::Validation("investor id is required".to_string()));
    }

    let project = aggregate::lock_project(txn, project_id).await?;
    if project.status != ProjectStatus::Active {
        return Err(AppError::Validation(format!(
            "project {} is not accepting investments (status: {:?})",
            project_id, project.status
        )));
    }

    let raised = project
        .raised
        .checked_add(amount)
        .ok_or_else(|| AppError::Validation("investment amount is too large".to_string()))?;

    let entry = investment::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project_id),
        investor_id: Set(investor_id.to_string()),
        amount: Set(amount),
        status: Set(InvestmentStatus::Active),
        reverses_id: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let project = set_raised(txn, project, raised).await?;
    let state = ProjectState::load(txn, project).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    tracing::info!(raised, "investment recorded");
    Ok(entry)
}

/// Appends the compensating entry for an active investment. Refused once
/// any funds were released, and while an unlock request is awaiting a
/// decision, since that request was granted against the current total.
#[tracing::instrument(skip_all, fields(investment_id = %investment_id, actor = %actor.id))]
pub async fn cancel_investment(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    investment_id: Uuid,
    actor: &Actor,
) -> Result<investment::Model, AppError> {
    let original = Investment::find_by_id(investment_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("investment {}", investment_id)))?;

    if actor.role != Role::Admin && actor.id != original.investor_id {
        return Err(AppError::Forbidden(
            "only the investor or an admin may cancel an investment".to_string(),
        ));
    }
    if original.status != InvestmentStatus::Active {
        return Err(AppError::Conflict(
            "cancellation entries cannot themselves be cancelled".to_string(),
        ));
    }

    let project = aggregate::lock_project(txn, original.project_id).await?;
    if project.status != ProjectStatus::Active {
        return Err(AppError::Validation(format!(
            "project {} is not active (status: {:?})",
            project.id, project.status
        )));
    }

    if let Some(pending) = unlock::pending_request_for(txn, project.id).await? {
        return Err(AppError::Conflict(format!(
            "unlock request {} is awaiting a decision; cancel once it is resolved",
            pending.id
        )));
    }

    let already_cancelled = Investment::find()
        .filter(investment::Column::ReversesId.eq(investment_id))
        .one(txn)
        .await?
        .is_some();
    if already_cancelled {
        return Err(AppError::Conflict(format!(
            "investment {} is already cancelled",
            investment_id
        )));
    }

    let state = ProjectState::load(txn, project).await?;
    if state.last_released().is_some() {
        return Err(AppError::Conflict(
            "funds have already been released from escrow for this project".to_string(),
        ));
    }

    let entry = investment::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(original.project_id),
        investor_id: Set(original.investor_id.clone()),
        amount: Set(original.amount),
        status: Set(InvestmentStatus::Cancelled),
        reverses_id: Set(Some(original.id)),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let raised = state.project.raised - original.amount;
    let project = set_raised(txn, state.project, raised).await?;
    let state = ProjectState::load(txn, project).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    tracing::info!(raised, "investment cancelled");
    Ok(entry)
}

async fn set_raised(
    txn: &DatabaseTransaction,
    project: project::Model,
    raised: i64,
) -> Result<project::Model, AppError> {
    let mut active: project::ActiveModel = project.into();
    active.raised = Set(raised);
    Ok(active.update(txn).await?)
}

pub async fn total_raised<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<i64, AppError> {
    Ok(aggregate::find_project(conn, project_id).await?.raised)
}

pub async fn investor_count<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<u64, AppError> {
    let entries = list_investments(conn, project_id).await?;
    Ok(distinct_investors(&entries))
}

pub async fn list_investments<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Vec<investment::Model>, AppError> {
    Ok(Investment::find()
        .filter(investment::Column::ProjectId.eq(project_id))
        .order_by_asc(investment::Column::CreatedAt)
        .all(conn)
        .await?)
}
