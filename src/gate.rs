//! Funding Gate: decides whether the next milestone of a project may be
//! the subject of an unlock request.
//!
//! The first milestone is gated on the share of the funding goal raised so
//! far. Every later milestone is gated on an approved completion proof for
//! its predecessor, not on further funding, unless
//! [`FundingPolicy::later_milestone_threshold_pct`] is configured.

use std::fmt;

use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregate::ProjectState;
use crate::entities::{milestone, MilestoneStatus, ProjectStatus, ProofStatus};
use crate::error::AppError;

/// Funding thresholds, in whole percent of the project's funding goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FundingPolicy {
    /// Required before milestone 1 can be requested. Boundary-inclusive.
    pub first_milestone_threshold_pct: u8,
    /// Optional extra funding gate for milestones 2..N.
    pub later_milestone_threshold_pct: Option<u8>,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            first_milestone_threshold_pct: 50,
            later_milestone_threshold_pct: None,
        }
    }
}

impl FundingPolicy {
    pub fn threshold_for(&self, position: i32) -> Option<u8> {
        if position <= 1 {
            Some(self.first_milestone_threshold_pct)
        } else {
            self.later_milestone_threshold_pct
        }
    }
}

pub fn meets_threshold(raised: i64, goal: i64, pct: u8) -> bool {
    i128::from(raised) * 100 >= i128::from(goal) * i128::from(pct)
}

/// Amount still missing before `pct` of `goal` is raised, rounded up to
/// the next minor unit.
pub fn threshold_shortfall(raised: i64, goal: i64, pct: u8) -> i64 {
    let required = (i128::from(goal) * i128::from(pct) + 99) / 100;
    (required - i128::from(raised)).max(0) as i64
}

pub fn percent_funded(raised: i64, goal: i64) -> f64 {
    if goal <= 0 {
        return 0.0;
    }
    raised as f64 / goal as f64 * 100.0
}

/// Why an unlock request is not currently possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum IneligibleReason {
    ProjectNotActive {
        status: ProjectStatus,
    },
    NothingLeftToUnlock,
    FundingThresholdUnmet {
        milestone_id: Uuid,
        threshold_pct: u8,
        amount_needed: i64,
    },
    PreviousMilestoneNotReleased {
        position: i32,
    },
    ProofRequired {
        milestone_id: Uuid,
        milestone_name: String,
        /// Status of the most recent proof, if one was ever submitted.
        proof_status: Option<ProofStatus>,
    },
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::ProjectNotActive { status } => {
                write!(f, "project is not active (status: {:?})", status)
            }
            IneligibleReason::NothingLeftToUnlock => {
                write!(f, "all milestones have already been released")
            }
            IneligibleReason::FundingThresholdUnmet {
                threshold_pct,
                amount_needed,
                ..
            } => write!(
                f,
                "{} more is needed to reach the {}% funding threshold",
                amount_needed, threshold_pct
            ),
            IneligibleReason::PreviousMilestoneNotReleased { position } => {
                write!(f, "milestone {} has not been released yet", position)
            }
            IneligibleReason::ProofRequired {
                milestone_name,
                proof_status,
                ..
            } => match proof_status {
                Some(ProofStatus::Pending) => write!(
                    f,
                    "proof for milestone '{}' is awaiting review",
                    milestone_name
                ),
                Some(ProofStatus::Rejected) => write!(
                    f,
                    "proof for milestone '{}' was rejected; submit a new one",
                    milestone_name
                ),
                _ => write!(
                    f,
                    "an approved proof for milestone '{}' is required",
                    milestone_name
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateDecision {
    Eligible {
        milestone: milestone::Model,
        /// Funding still missing to cover every milestone up to this one.
        /// Informational only; it does not block the request.
        amount_needed: i64,
    },
    NotEligible {
        reason: IneligibleReason,
    },
}

impl GateDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, GateDecision::Eligible { .. })
    }

    pub fn milestone(&self) -> Option<&milestone::Model> {
        match self {
            GateDecision::Eligible { milestone, .. } => Some(milestone),
            GateDecision::NotEligible { .. } => None,
        }
    }
}

fn not_eligible(reason: IneligibleReason) -> GateDecision {
    GateDecision::NotEligible { reason }
}

pub fn can_request_unlock(policy: &FundingPolicy, state: &ProjectState) -> GateDecision {
    let project = &state.project;
    let raised = project.raised;
    let goal = project.funding_goal;

    let Some(next) = state.next_pending() else {
        return not_eligible(IneligibleReason::NothingLeftToUnlock);
    };

    if project.status != ProjectStatus::Active {
        return not_eligible(IneligibleReason::ProjectNotActive {
            status: project.status,
        });
    }

    if next.position == 1 && !meets_threshold(raised, goal, policy.first_milestone_threshold_pct) {
        return not_eligible(IneligibleReason::FundingThresholdUnmet {
            milestone_id: next.id,
            threshold_pct: policy.first_milestone_threshold_pct,
            amount_needed: threshold_shortfall(raised, goal, policy.first_milestone_threshold_pct),
        });
    }

    if next.position > 1 {
        let previous = match state.milestone_at(next.position - 1) {
            Some(previous) if previous.is_released() => previous,
            _ => {
                return not_eligible(IneligibleReason::PreviousMilestoneNotReleased {
                    position: next.position - 1,
                })
            }
        };

        if !state.has_approved_proof(previous.id) {
            return not_eligible(IneligibleReason::ProofRequired {
                milestone_id: previous.id,
                milestone_name: previous.name.clone(),
                proof_status: state.latest_proof(previous.id).map(|p| p.status),
            });
        }

        if let Some(pct) = policy.later_milestone_threshold_pct {
            if !meets_threshold(raised, goal, pct) {
                return not_eligible(IneligibleReason::FundingThresholdUnmet {
                    milestone_id: next.id,
                    threshold_pct: pct,
                    amount_needed: threshold_shortfall(raised, goal, pct),
                });
            }
        }
    }

    GateDecision::Eligible {
        milestone: next.clone(),
        amount_needed: (state.cumulative_amount(next.position) - raised).max(0),
    }
}

/// Materialises the gate's verdict into milestone statuses: the eligible
/// milestone becomes `unlockable`, every other unreleased one `locked`.
/// A milestone with an open request keeps `unlock_requested`.
pub async fn sync_milestone_statuses<C: ConnectionTrait>(
    conn: &C,
    policy: &FundingPolicy,
    state: &ProjectState,
) -> Result<(), AppError> {
    let decision = can_request_unlock(policy, state);
    let eligible_id = decision.milestone().map(|m| m.id);

    for m in state.milestones.iter().filter(|m| !m.is_released()) {
        if m.status == MilestoneStatus::UnlockRequested {
            continue;
        }
        let desired = if Some(m.id) == eligible_id {
            MilestoneStatus::Unlockable
        } else {
            MilestoneStatus::Locked
        };
        if m.status != desired {
            tracing::debug!(
                milestone_id = %m.id,
                from = ?m.status,
                to = ?desired,
                "milestone status change"
            );
            let mut active: milestone::ActiveModel = m.clone().into();
            active.status = Set(desired);
            active.update(conn).await?;
        }
    }

    Ok(())
}
