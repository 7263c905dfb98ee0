mod common;

use common::{fixture, fixture_with_policy};
use fundgate::auth::Actor;
use fundgate::decisions::DecisionAction;
use fundgate::entities::{MilestoneStatus, ProjectStatus, ProofStatus, RequestStatus};
use fundgate::error::AppError;
use fundgate::gate::{FundingPolicy, GateDecision, IneligibleReason};
use fundgate::projects::{NewProject, ReviewAction};
use fundgate::proofs::ProofDecision;
use fundgate::FundingService;

fn milestone_statuses(overview: &fundgate::projects::ProjectOverview) -> Vec<MilestoneStatus> {
    overview.milestones.iter().map(|m| m.status).collect()
}

#[tokio::test]
async fn funds_flow_through_both_milestones_to_completion() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;

    let stats = fx.service.funding_stats(project.id).await.unwrap();
    assert!(stats.can_request_unlock);
    assert_eq!(stats.raised, 5_000);
    assert_eq!(stats.investor_count, 1);
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(
        milestone_statuses(&overview),
        vec![MilestoneStatus::Unlockable, MilestoneStatus::Locked]
    );

    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    assert_eq!(receipt.milestone_position, 1);
    assert_eq!(receipt.amount, 4_000);
    assert_eq!(receipt.request.status, RequestStatus::Pending);

    let approved = fx
        .service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, Some("go".to_string()))
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.admin_id.as_deref(), Some("admin-1"));
    assert_eq!(approved.escrow_receipt.as_deref(), Some("rcpt-1"));
    {
        let releases = fx.escrow.releases.lock().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].amount, 4_000);
        assert_eq!(releases[0].idempotency_key, receipt.request.id);
    }

    // Milestone 2 now waits on a proof for milestone 1, not on funding.
    let first = overview.milestones[0].clone();
    match fx.service.request_unlock(project.id, &fx.artist).await {
        Err(AppError::NotEligible(IneligibleReason::ProofRequired {
            milestone_id,
            proof_status,
            ..
        })) => {
            assert_eq!(milestone_id, first.id);
            assert_eq!(proof_status, None);
        }
        other => panic!("expected proof_required, got {:?}", other),
    }

    let proof = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "Studio invoices", "uploads/invoices.pdf")
        .await
        .unwrap();
    fx.service
        .resolve_proof(proof.id, &fx.admin, ProofDecision::Approve, None)
        .await
        .unwrap();

    match fx.service.can_request_unlock(project.id).await.unwrap() {
        GateDecision::Eligible { milestone, amount_needed } => {
            assert_eq!(milestone.position, 2);
            assert_eq!(amount_needed, 5_000);
        }
        other => panic!("expected milestone 2 to be eligible, got {:?}", other),
    }

    let second = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    assert_eq!(second.milestone_position, 2);
    fx.service
        .decide(second.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();

    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.project.status, ProjectStatus::Completed);
    assert_eq!(
        milestone_statuses(&overview),
        vec![MilestoneStatus::Released, MilestoneStatus::Released]
    );
    assert_eq!(fx.escrow.released_amounts(), vec![4_000, 6_000]);
    assert_eq!(
        fx.service.can_request_unlock(project.id).await.unwrap(),
        GateDecision::NotEligible {
            reason: IneligibleReason::NothingLeftToUnlock
        }
    );
}

#[tokio::test]
async fn rejected_request_leaves_milestone_unreleased_and_can_be_retried() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 6_000).await;

    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    let rejected = fx
        .service
        .decide(
            receipt.request.id,
            &fx.admin,
            DecisionAction::Reject,
            Some("budget unclear".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.admin_response.as_deref(), Some("budget unclear"));
    assert_eq!(fx.escrow.call_count(), 0);

    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[0].status, MilestoneStatus::Unlockable);
    assert!(overview.milestones[0].released_at.is_none());

    let again = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    assert_eq!(again.milestone_position, 1);
    assert_ne!(again.request.id, receipt.request.id);
}

#[tokio::test]
async fn first_milestone_gate_is_inclusive_at_half_the_goal() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 4_999).await;

    match fx.service.request_unlock(project.id, &fx.artist).await {
        Err(AppError::NotEligible(IneligibleReason::FundingThresholdUnmet {
            threshold_pct,
            amount_needed,
            ..
        })) => {
            assert_eq!(threshold_pct, 50);
            assert_eq!(amount_needed, 1);
        }
        other => panic!("expected funding_threshold_unmet, got {:?}", other),
    }
    let stats = fx.service.funding_stats(project.id).await.unwrap();
    assert!(!stats.can_request_unlock);

    fx.invest(&project, "investor-2", 1).await;
    let stats = fx.service.funding_stats(project.id).await.unwrap();
    assert!(stats.can_request_unlock);
    assert_eq!(stats.investor_count, 2);
    assert!(fx.service.request_unlock(project.id, &fx.artist).await.is_ok());
}

#[tokio::test]
async fn second_decision_on_the_same_request_conflicts() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();

    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();
    let second = fx
        .service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Reject, None)
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))), "got {:?}", second);

    let requests = fx.service.list_unlock_requests(project.id).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, RequestStatus::Approved);
    assert_eq!(fx.escrow.call_count(), 1);
}

#[tokio::test]
async fn only_one_request_may_be_pending() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;

    fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    let duplicate = fx.service.request_unlock(project.id, &fx.artist).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))), "got {:?}", duplicate);

    let stats = fx.service.funding_stats(project.id).await.unwrap();
    assert!(stats.has_pending_request);
    assert!(!stats.can_request_unlock);
    assert_eq!(fx.service.pending_unlock_requests(&fx.admin).await.unwrap().len(), 1);
}

#[tokio::test]
async fn escrow_failure_keeps_the_request_pending() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();

    fx.escrow.set_failing(true);
    let failed = fx
        .service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await;
    assert!(matches!(failed, Err(AppError::ReleaseFailed(_))), "got {:?}", failed);

    let requests = fx.service.list_unlock_requests(project.id).await.unwrap();
    assert_eq!(requests[0].status, RequestStatus::Pending);
    assert!(requests[0].admin_id.is_none());
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[0].status, MilestoneStatus::UnlockRequested);
    assert_eq!(overview.project.status, ProjectStatus::Active);

    fx.escrow.set_failing(false);
    let approved = fx
        .service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(fx.escrow.released_amounts(), vec![4_000]);
}

#[tokio::test]
async fn schedule_is_frozen_once_funding_begins() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;

    // Still replaceable before the first investment.
    let published = fx
        .service
        .publish_schedule(project.id, &fx.artist, &common::drafts(&[3_000, 3_000, 4_000]))
        .await
        .unwrap();
    assert_eq!(published.milestones.len(), 3);
    assert!(published.warnings.is_empty());

    fx.invest(&project, "investor-1", 100).await;
    let result = fx
        .service
        .publish_schedule(project.id, &fx.artist, &common::drafts(&[10_000]))
        .await;
    assert!(matches!(result, Err(AppError::ImmutableSchedule)), "got {:?}", result);
}

#[tokio::test]
async fn only_the_owner_requests_and_only_admins_decide() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;

    let stranger = Actor::artist("artist-2");
    let result = fx.service.request_unlock(project.id, &stranger).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))), "got {:?}", result);

    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    let investor = Actor::investor("investor-1");
    let result = fx
        .service
        .decide(receipt.request.id, &investor, DecisionAction::Approve, None)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))), "got {:?}", result);
    assert!(matches!(
        fx.service.pending_unlock_requests(&fx.artist).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn proofs_follow_the_release_sequence() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;
    let overview = fx.service.project_overview(project.id).await.unwrap();
    let (first, second) = (overview.milestones[0].clone(), overview.milestones[1].clone());

    let early = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "receipts", "uploads/r.pdf")
        .await;
    assert!(matches!(early, Err(AppError::Sequence(_))), "got {:?}", early);

    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();

    let wrong = fx
        .service
        .submit_proof(project.id, second.id, &fx.artist, "receipts", "uploads/r.pdf")
        .await;
    assert!(matches!(wrong, Err(AppError::Sequence(_))), "got {:?}", wrong);

    let blank = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "  ", "uploads/r.pdf")
        .await;
    assert!(matches!(blank, Err(AppError::Validation(_))), "got {:?}", blank);

    let proof = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "receipts", "uploads/r.pdf")
        .await
        .unwrap();
    let duplicate = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "more receipts", "uploads/r2.pdf")
        .await;
    assert!(matches!(duplicate, Err(AppError::Sequence(_))), "got {:?}", duplicate);

    let needed = fx.service.needs_proof_for_milestone(project.id).await.unwrap().unwrap();
    assert_eq!(needed.milestone.id, first.id);
    assert_eq!(needed.latest_proof_status, Some(ProofStatus::Pending));

    // A rejected proof can be replaced.
    fx.service
        .resolve_proof(proof.id, &fx.admin, ProofDecision::Reject, Some("illegible".to_string()))
        .await
        .unwrap();
    match fx.service.can_request_unlock(project.id).await.unwrap() {
        GateDecision::NotEligible {
            reason: IneligibleReason::ProofRequired { proof_status, .. },
        } => assert_eq!(proof_status, Some(ProofStatus::Rejected)),
        other => panic!("expected proof_required, got {:?}", other),
    }
    let again = fx
        .service
        .resolve_proof(proof.id, &fx.admin, ProofDecision::Approve, None)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))), "got {:?}", again);

    let replacement = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "scanned receipts", "uploads/r3.pdf")
        .await
        .unwrap();
    fx.service
        .resolve_proof(replacement.id, &fx.admin, ProofDecision::Approve, None)
        .await
        .unwrap();

    assert!(fx.service.needs_proof_for_milestone(project.id).await.unwrap().is_none());
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[1].status, MilestoneStatus::Unlockable);
    assert_eq!(fx.service.list_proofs(project.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn later_milestones_can_carry_their_own_funding_threshold() {
    let fx = fixture_with_policy(FundingPolicy {
        first_milestone_threshold_pct: 50,
        later_milestone_threshold_pct: Some(80),
    })
    .await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();
    let first = fx.service.project_overview(project.id).await.unwrap().milestones[0].clone();
    let proof = fx
        .service
        .submit_proof(project.id, first.id, &fx.artist, "receipts", "uploads/r.pdf")
        .await
        .unwrap();
    fx.service
        .resolve_proof(proof.id, &fx.admin, ProofDecision::Approve, None)
        .await
        .unwrap();

    match fx.service.request_unlock(project.id, &fx.artist).await {
        Err(AppError::NotEligible(IneligibleReason::FundingThresholdUnmet {
            threshold_pct,
            amount_needed,
            ..
        })) => {
            assert_eq!(threshold_pct, 80);
            assert_eq!(amount_needed, 3_000);
        }
        other => panic!("expected funding_threshold_unmet, got {:?}", other),
    }

    fx.invest(&project, "investor-2", 3_000).await;
    let second = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    assert_eq!(second.milestone_position, 2);
}

#[tokio::test]
async fn cancellations_append_compensating_entries() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    let kept = fx.service.record_investment(project.id, "investor-1", 3_000).await.unwrap();
    let cancelled = fx.service.record_investment(project.id, "investor-2", 2_000).await.unwrap();

    let other = Actor::investor("investor-1");
    let result = fx.service.cancel_investment(cancelled.id, &other).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))), "got {:?}", result);

    let owner = Actor::investor("investor-2");
    let entry = fx.service.cancel_investment(cancelled.id, &owner).await.unwrap();
    assert_eq!(entry.reverses_id, Some(cancelled.id));
    assert_eq!(fx.service.total_raised(project.id).await.unwrap(), 3_000);
    assert_eq!(fx.service.investor_count(project.id).await.unwrap(), 1);
    assert_eq!(fx.service.list_investments(project.id).await.unwrap().len(), 3);

    let twice = fx.service.cancel_investment(cancelled.id, &owner).await;
    assert!(matches!(twice, Err(AppError::Conflict(_))), "got {:?}", twice);
    let reversal = fx.service.cancel_investment(entry.id, &fx.admin).await;
    assert!(matches!(reversal, Err(AppError::Conflict(_))), "got {:?}", reversal);

    // Released funds freeze the ledger for cancellations.
    fx.invest(&project, "investor-3", 2_000).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();
    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();
    let frozen = fx.service.cancel_investment(kept.id, &fx.admin).await;
    assert!(matches!(frozen, Err(AppError::Conflict(_))), "got {:?}", frozen);
}

#[tokio::test]
async fn cancelling_below_the_threshold_relocks_the_first_milestone() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    let entry = fx.service.record_investment(project.id, "investor-1", 5_000).await.unwrap();
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[0].status, MilestoneStatus::Unlockable);

    fx.service
        .cancel_investment(entry.id, &Actor::investor("investor-1"))
        .await
        .unwrap();
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.project.raised, 0);
    assert_eq!(overview.milestones[0].status, MilestoneStatus::Locked);
}

#[tokio::test]
async fn projects_must_be_reviewed_before_raising_funds() {
    let fx = fixture().await;
    let invalid = fx
        .service
        .create_project(&fx.artist, NewProject { title: "EP".to_string(), funding_goal: 0 })
        .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))), "got {:?}", invalid);
    let not_artist = fx
        .service
        .create_project(&fx.admin, NewProject { title: "EP".to_string(), funding_goal: 100 })
        .await;
    assert!(matches!(not_artist, Err(AppError::Forbidden(_))), "got {:?}", not_artist);

    let project = fx
        .service
        .create_project(&fx.artist, NewProject { title: "EP".to_string(), funding_goal: 8_000 })
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Draft);

    let early = fx.service.record_investment(project.id, "investor-1", 100).await;
    assert!(matches!(early, Err(AppError::Validation(_))), "got {:?}", early);
    let unscheduled = fx.service.review_project(project.id, &fx.admin, ReviewAction::Approve).await;
    assert!(matches!(unscheduled, Err(AppError::Validation(_))), "got {:?}", unscheduled);

    let published = fx
        .service
        .publish_schedule(project.id, &fx.artist, &common::drafts(&[5_000]))
        .await
        .unwrap();
    assert_eq!(published.warnings.len(), 1);

    let active = fx
        .service
        .review_project(project.id, &fx.admin, ReviewAction::Approve)
        .await
        .unwrap();
    assert_eq!(active.status, ProjectStatus::Active);
    let twice = fx.service.review_project(project.id, &fx.admin, ReviewAction::Reject).await;
    assert!(matches!(twice, Err(AppError::Conflict(_))), "got {:?}", twice);

    fx.invest(&active, "investor-1", 4_000).await;
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[0].status, MilestoneStatus::Unlockable);
}

#[tokio::test]
async fn investments_cannot_be_cancelled_while_a_request_awaits_a_decision() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    let entry = fx
        .service
        .record_investment(project.id, "investor-1", 5_000)
        .await
        .unwrap();
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();

    let investor = Actor::investor("investor-1");
    let blocked = fx.service.cancel_investment(entry.id, &investor).await;
    assert!(matches!(blocked, Err(AppError::Conflict(_))), "got {:?}", blocked);
    let by_admin = fx.service.cancel_investment(entry.id, &fx.admin).await;
    assert!(matches!(by_admin, Err(AppError::Conflict(_))), "got {:?}", by_admin);
    assert_eq!(fx.service.total_raised(project.id).await.unwrap(), 5_000);
    assert_eq!(fx.service.list_investments(project.id).await.unwrap().len(), 1);

    // Once the request is resolved without a release, cancelling works again.
    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Reject, None)
        .await
        .unwrap();
    fx.service.cancel_investment(entry.id, &investor).await.unwrap();
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.project.raised, 0);
    assert_eq!(overview.milestones[0].status, MilestoneStatus::Locked);
    assert_eq!(fx.escrow.call_count(), 0);
}

#[tokio::test]
async fn approval_re_evaluates_the_funding_gate() {
    let fx = fixture().await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    fx.invest(&project, "investor-1", 5_000).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();

    // Same database, stricter policy: the request filed at 50% no longer qualifies.
    let strict = FundingService::new(
        fx.service.db().clone(),
        fx.escrow.clone(),
        common::fast_settings(FundingPolicy {
            first_milestone_threshold_pct: 80,
            later_milestone_threshold_pct: None,
        }),
    );
    match strict
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
    {
        Err(AppError::NotEligible(IneligibleReason::FundingThresholdUnmet {
            threshold_pct,
            amount_needed,
            ..
        })) => {
            assert_eq!(threshold_pct, 80);
            assert_eq!(amount_needed, 3_000);
        }
        other => panic!("expected funding_threshold_unmet, got {:?}", other),
    }
    assert_eq!(fx.escrow.call_count(), 0);
    let requests = fx.service.list_unlock_requests(project.id).await.unwrap();
    assert_eq!(requests[0].status, RequestStatus::Pending);
    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones[0].status, MilestoneStatus::UnlockRequested);

    let approved = fx
        .service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(fx.escrow.released_amounts(), vec![4_000]);
}

#[tokio::test]
async fn schedule_is_frozen_once_an_unlock_request_exists() {
    let fx = fixture_with_policy(FundingPolicy {
        first_milestone_threshold_pct: 0,
        later_milestone_threshold_pct: None,
    })
    .await;
    let project = fx.active_project(10_000, &[4_000, 6_000]).await;
    let receipt = fx.service.request_unlock(project.id, &fx.artist).await.unwrap();

    let pending = fx
        .service
        .publish_schedule(project.id, &fx.artist, &common::drafts(&[10_000]))
        .await;
    assert!(matches!(pending, Err(AppError::ImmutableSchedule)), "got {:?}", pending);

    // A rejected request still pins the milestone it referenced.
    fx.service
        .decide(receipt.request.id, &fx.admin, DecisionAction::Reject, None)
        .await
        .unwrap();
    let rejected = fx
        .service
        .publish_schedule(project.id, &fx.artist, &common::drafts(&[10_000]))
        .await;
    assert!(matches!(rejected, Err(AppError::ImmutableSchedule)), "got {:?}", rejected);

    let overview = fx.service.project_overview(project.id).await.unwrap();
    assert_eq!(overview.milestones.len(), 2);
    assert_eq!(
        fx.service.list_unlock_requests(project.id).await.unwrap()[0].milestone_id,
        overview.milestones[0].id
    );
}
