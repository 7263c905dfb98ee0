//! Milestone schedule: the ordered, fixed-amount plan a project's funds are
//! released against. Publishable until the first ledger entry or unlock
//! request exists.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::{self, ProjectState};
use crate::auth::Actor;
use crate::entities::{
    fund_unlock_request, investment, milestone, FundUnlockRequest, Investment, Milestone,
    MilestoneStatus, ProjectStatus,
};
use crate::error::AppError;
use crate::gate::{self, FundingPolicy};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct MilestoneDraft {
    /// Completion order, starting at 1
    pub position: i32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Amount in minor currency units
    pub amount: i64,
}

/// Non-fatal mismatches between the schedule and the funding goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ScheduleWarning {
    TotalBelowGoal { total: i64, funding_goal: i64 },
    TotalExceedsGoal { total: i64, funding_goal: i64 },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublishedSchedule {
    pub milestones: Vec<milestone::Model>,
    pub warnings: Vec<ScheduleWarning>,
}

pub fn validate_schedule(drafts: &[MilestoneDraft]) -> Result<(), AppError> {
    if drafts.is_empty() {
        return Err(AppError::Validation(
            "a schedule needs at least one milestone".to_string(),
        ));
    }

    for (index, draft) in drafts.iter().enumerate() {
        let expected = index as i32 + 1;
        if draft.position != expected {
            let message = if drafts[..index].iter().any(|d| d.position == draft.position) {
                format!("duplicate milestone position {}", draft.position)
            } else if index == 0 {
                format!("milestone positions must start at 1, got {}", draft.position)
            } else {
                format!(
                    "milestone positions must be strictly increasing without gaps: \
                     expected {}, got {}",
                    expected, draft.position
                )
            };
            return Err(AppError::Validation(message));
        }
        if draft.name.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "milestone {} needs a name",
                draft.position
            )));
        }
        if draft.amount <= 0 {
            return Err(AppError::Validation(format!(
                "milestone {} amount must be greater than zero",
                draft.position
            )));
        }
    }

    drafts
        .iter()
        .try_fold(0i64, |acc, d| acc.checked_add(d.amount))
        .ok_or_else(|| AppError::Validation("milestone amounts overflow".to_string()))?;

    Ok(())
}

pub fn consistency_warnings(
    funding_goal: i64,
    drafts: &[MilestoneDraft],
) -> Vec<ScheduleWarning> {
    let total: i64 = drafts.iter().map(|d| d.amount).sum();
    match total.cmp(&funding_goal) {
        std::cmp::Ordering::Less => vec![ScheduleWarning::TotalBelowGoal {
            total,
            funding_goal,
        }],
        std::cmp::Ordering::Greater => vec![ScheduleWarning::TotalExceedsGoal {
            total,
            funding_goal,
        }],
        std::cmp::Ordering::Equal => Vec::new(),
    }
}

#[tracing::instrument(skip_all, fields(project_id = %project_id, milestones = drafts.len()))]
pub async fn publish(
    txn: &DatabaseTransaction,
    policy: &FundingPolicy,
    project_id: Uuid,
    actor: &Actor,
    drafts: &[MilestoneDraft],
) -> Result<PublishedSchedule, AppError> {
    validate_schedule(drafts)?;

    let project = aggregate::lock_project(txn, project_id).await?;
    actor.require_owner(&project)?;

    if !matches!(project.status, ProjectStatus::Draft | ProjectStatus::Active) {
        return Err(AppError::Validation(format!(
            "cannot publish a schedule for a {:?} project",
            project.status
        )));
    }

    let entries = Investment::find()
        .filter(investment::Column::ProjectId.eq(project_id))
        .count(txn)
        .await?;
    if entries > 0 {
        return Err(AppError::ImmutableSchedule);
    }

    // A zero first-milestone threshold lets requests exist before any
    // investment does.
    let requests = FundUnlockRequest::find()
        .filter(fund_unlock_request::Column::ProjectId.eq(project_id))
        .count(txn)
        .await?;
    if requests > 0 {
        return Err(AppError::ImmutableSchedule);
    }

    // Proofs need a released milestone, hence an unlock request, so nothing
    // else can reference these.
    Milestone::delete_many()
        .filter(milestone::Column::ProjectId.eq(project_id))
        .exec(txn)
        .await?;

    let now = Utc::now();
    for draft in drafts {
        milestone::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            position: Set(draft.position),
            name: Set(draft.name.trim().to_string()),
            description: Set(draft.description.clone()),
            amount: Set(draft.amount),
            status: Set(MilestoneStatus::Locked),
            released_at: Set(None),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
    }

    let warnings = consistency_warnings(project.funding_goal, drafts);
    for warning in &warnings {
        tracing::warn!(?warning, "milestone schedule does not match the funding goal");
    }

    let state = ProjectState::load(txn, project).await?;
    gate::sync_milestone_statuses(txn, policy, &state).await?;

    Ok(PublishedSchedule {
        milestones: milestones_for(txn, project_id).await?,
        warnings,
    })
}

pub async fn milestones_for<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Vec<milestone::Model>, AppError> {
    Ok(Milestone::find()
        .filter(milestone::Column::ProjectId.eq(project_id))
        .order_by_asc(milestone::Column::Position)
        .all(conn)
        .await?)
}

/// Lowest-position milestone not yet released, or `None` once all are.
pub async fn next_pending_milestone<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<Option<milestone::Model>, AppError> {
    Ok(Milestone::find()
        .filter(milestone::Column::ProjectId.eq(project_id))
        .filter(milestone::Column::Status.ne(MilestoneStatus::Released))
        .order_by_asc(milestone::Column::Position)
        .one(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(position: i32, amount: i64) -> MilestoneDraft {
        MilestoneDraft {
            position,
            name: format!("Step {}", position),
            description: String::new(),
            amount,
        }
    }

    fn validation_message(drafts: &[MilestoneDraft]) -> String {
        match validate_schedule(drafts) {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_gap_free_schedule() {
        assert!(validate_schedule(&[draft(1, 4_000), draft(2, 6_000)]).is_ok());
    }

    #[test]
    fn rejects_bad_ordering() {
        assert!(validation_message(&[]).contains("at least one"));
        assert!(validation_message(&[draft(2, 100)]).contains("start at 1"));
        assert!(validation_message(&[draft(1, 100), draft(3, 100)]).contains("without gaps"));
        assert!(validation_message(&[draft(1, 100), draft(1, 100)]).contains("duplicate"));
        assert!(validation_message(&[draft(1, 100), draft(3, 100), draft(2, 100)])
            .contains("without gaps"));
    }

    #[test]
    fn rejects_non_positive_amounts_and_blank_names() {
        assert!(validation_message(&[draft(1, 0)]).contains("greater than zero"));
        let mut unnamed = draft(1, 100);
        unnamed.name = "  ".to_string();
        assert!(validation_message(&[unnamed]).contains("needs a name"));
    }

    #[test]
    fn warns_when_totals_and_goal_disagree() {
        let drafts = [draft(1, 4_000), draft(2, 6_000)];
        assert!(consistency_warnings(10_000, &drafts).is_empty());
        assert_eq!(
            consistency_warnings(12_000, &drafts),
            vec![ScheduleWarning::TotalBelowGoal { total: 10_000, funding_goal: 12_000 }]
        );
        assert_eq!(
            consistency_warnings(8_000, &drafts),
            vec![ScheduleWarning::TotalExceedsGoal { total: 10_000, funding_goal: 8_000 }]
        );
    }
}
