//! The per-project transactional boundary.
//!
//! Every command that mutates a project (ledger, schedule, requests, proofs)
//! opens a transaction and starts by bumping the project's `version` with a
//! compare-and-set. Two writers racing on one project cannot both win: the
//! loser gets [`AppError::StaleAggregate`], its transaction is dropped, and
//! [`retry_transient`] re-runs the whole command against fresh state.

use std::future::Future;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::Error as BackoffError;
use backoff::ExponentialBackoff;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::entities::{milestone, milestone_proof, project, Milestone, MilestoneProof, Project};
use crate::error::AppError;

pub async fn find_project<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<project::Model, AppError> {
    Project::find_by_id(project_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("project {}", project_id)))
}

/// Claims the project aggregate for the enclosing transaction.
pub async fn lock_project(
    txn: &DatabaseTransaction,
    project_id: Uuid,
) -> Result<project::Model, AppError> {
    let current = find_project(txn, project_id).await?;
    claim_version(txn, current).await
}

/// Compare-and-set on `current.version`. Fails with
/// [`AppError::StaleAggregate`] if another transaction bumped the version
/// after `current` was read.
pub async fn claim_version(
    txn: &DatabaseTransaction,
    current: project::Model,
) -> Result<project::Model, AppError> {
    let now = Utc::now();

    let result = Project::update_many()
        .col_expr(
            project::Column::Version,
            Expr::col(project::Column::Version).add(1),
        )
        .col_expr(project::Column::UpdatedAt, Expr::value(now))
        .filter(project::Column::Id.eq(current.id))
        .filter(project::Column::Version.eq(current.version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::StaleAggregate(current.id));
    }

    Ok(project::Model {
        version: current.version + 1,
        updated_at: now,
        ..current
    })
}

// --- Transient-failure notification handler ---
fn transient_notify_handler(err: AppError, duration: Duration) {
    tracing::warn!(
        "Command hit a transient failure ({}). Retrying in {:.3}s with fresh state...",
        err,
        duration.as_secs_f32()
    );
}

/// Re-runs `op` while it fails with a transient error (see
/// [`AppError::is_transient`]), at most `max_attempts` times. Anything else
/// (success or business error) is returned as-is; the command is never
/// re-applied blindly, it recomputes its checks on every attempt.
///
/// A race still lost on the last attempt is reported as
/// [`AppError::Conflict`]; a storage failure is reported unchanged.
pub async fn retry_transient<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = max_attempts.max(1);
    let backoff = ExponentialBackoff {
        current_interval: Duration::from_millis(5),
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(200),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempts = 0u32;
    let outcome = retry_notify(
        backoff,
        || {
            attempts += 1;
            let attempt = attempts;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_transient() && attempt < max_attempts => {
                        Err(BackoffError::transient(err))
                    }
                    Err(err) => Err(BackoffError::permanent(err)),
                }
            }
        },
        transient_notify_handler,
    )
    .await;

    outcome.map_err(|err| match err {
        AppError::StaleAggregate(project_id) => AppError::Conflict(format!(
            "project {} is being modified concurrently; refresh and retry",
            project_id
        )),
        other => other,
    })
}

/// Everything the gate and the proof tracker read about one project,
/// loaded in a single pass from the caller's connection or transaction.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub project: project::Model,
    /// Ordered by position.
    pub milestones: Vec<milestone::Model>,
    /// Ordered by creation time.
    pub proofs: Vec<milestone_proof::Model>,
}

impl ProjectState {
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        project: project::Model,
    ) -> Result<Self, AppError> {
        let milestones = Milestone::find()
            .filter(milestone::Column::ProjectId.eq(project.id))
            .order_by_asc(milestone::Column::Position)
            .all(conn)
            .await?;
        let proofs = MilestoneProof::find()
            .filter(milestone_proof::Column::ProjectId.eq(project.id))
            .order_by_asc(milestone_proof::Column::CreatedAt)
            .all(conn)
            .await?;

        Ok(Self {
            project,
            milestones,
            proofs,
        })
    }

    /// Lowest-position milestone not yet released.
    pub fn next_pending(&self) -> Option<&milestone::Model> {
        self.milestones.iter().find(|m| !m.is_released())
    }

    /// Highest-position released milestone.
    pub fn last_released(&self) -> Option<&milestone::Model> {
        self.milestones.iter().rev().find(|m| m.is_released())
    }

    pub fn milestone(&self, milestone_id: Uuid) -> Option<&milestone::Model> {
        self.milestones.iter().find(|m| m.id == milestone_id)
    }

    pub fn milestone_at(&self, position: i32) -> Option<&milestone::Model> {
        self.milestones.iter().find(|m| m.position == position)
    }

    pub fn latest_proof(&self, milestone_id: Uuid) -> Option<&milestone_proof::Model> {
        self.proofs
            .iter()
            .rev()
            .find(|p| p.milestone_id == milestone_id)
    }

    pub fn has_approved_proof(&self, milestone_id: Uuid) -> bool {
        self.proofs.iter().any(|p| {
            p.milestone_id == milestone_id && p.status == milestone_proof::ProofStatus::Approved
        })
    }

    pub fn all_released(&self) -> bool {
        !self.milestones.is_empty() && self.milestones.iter().all(|m| m.is_released())
    }

    /// Sum of milestone amounts up to and including `position`.
    pub fn cumulative_amount(&self, position: i32) -> i64 {
        self.milestones
            .iter()
            .filter(|m| m.position <= position)
            .map(|m| m.amount)
            .sum()
    }
}
