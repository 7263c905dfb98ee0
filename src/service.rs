//! Transactional facade over the domain modules.
//!
//! Every command runs in its own transaction, wrapped in
//! [`aggregate::retry_transient`] so that a lost race on the project
//! aggregate, or a dropped connection, re-runs the command from scratch.
//! Queries read straight from the pool.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use uuid::Uuid;

use crate::aggregate;
use crate::auth::Actor;
use crate::decisions::{self, DecisionAction};
use crate::entities::{fund_unlock_request, investment, milestone, milestone_proof, project};
use crate::error::AppError;
use crate::escrow::{EscrowGateway, EscrowRetryPolicy};
use crate::gate::{self, FundingPolicy, GateDecision};
use crate::ledger;
use crate::projects::{self, FundingStats, NewProject, ProjectOverview, ReviewAction};
use crate::proofs::{self, ProofDecision, ProofRequirement};
use crate::schedule::{self, MilestoneDraft, PublishedSchedule};
use crate::unlock::{self, UnlockRequestReceipt};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub policy: FundingPolicy,
    pub escrow_retry: EscrowRetryPolicy,
    /// Attempts per command before a lost race is reported as a conflict
    /// (or a storage failure is surfaced).
    pub stale_write_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            policy: FundingPolicy::default(),
            escrow_retry: EscrowRetryPolicy::default(),
            stale_write_attempts: 3,
        }
    }
}

#[derive(Clone)]
pub struct FundingService {
    db: DatabaseConnection,
    escrow: Arc<dyn EscrowGateway>,
    settings: ServiceSettings,
}

impl FundingService {
    pub fn new(
        db: DatabaseConnection,
        escrow: Arc<dyn EscrowGateway>,
        settings: ServiceSettings,
    ) -> Self {
        Self { db, escrow, settings }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn policy(&self) -> &FundingPolicy {
        &self.settings.policy
    }

    async fn begin(&self) -> Result<DatabaseTransaction, AppError> {
        Ok(self.db.begin().await?)
    }

    // --- Projects ---

    pub async fn create_project(
        &self,
        actor: &Actor,
        new_project: NewProject,
    ) -> Result<project::Model, AppError> {
        projects::create_project(&self.db, actor, new_project).await
    }

    pub async fn review_project(
        &self,
        project_id: Uuid,
        actor: &Actor,
        action: ReviewAction,
    ) -> Result<project::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let project =
                projects::review_project(&txn, &self.settings.policy, project_id, actor, action)
                    .await?;
            txn.commit().await?;
            Ok(project)
        })
        .await
    }

    pub async fn project_overview(&self, project_id: Uuid) -> Result<ProjectOverview, AppError> {
        projects::project_overview(&self.db, project_id).await
    }

    pub async fn funding_stats(&self, project_id: Uuid) -> Result<FundingStats, AppError> {
        projects::funding_stats(&self.db, &self.settings.policy, project_id).await
    }

    // --- Milestone schedule ---

    pub async fn publish_schedule(
        &self,
        project_id: Uuid,
        actor: &Actor,
        drafts: &[MilestoneDraft],
    ) -> Result<PublishedSchedule, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let published =
                schedule::publish(&txn, &self.settings.policy, project_id, actor, drafts).await?;
            txn.commit().await?;
            Ok(published)
        })
        .await
    }

    pub async fn next_pending_milestone(
        &self,
        project_id: Uuid,
    ) -> Result<Option<milestone::Model>, AppError> {
        aggregate::find_project(&self.db, project_id).await?;
        schedule::next_pending_milestone(&self.db, project_id).await
    }

    // --- Ledger ---

    pub async fn record_investment(
        &self,
        project_id: Uuid,
        investor_id: &str,
        amount: i64,
    ) -> Result<investment::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let entry = ledger::record_investment(
                &txn,
                &self.settings.policy,
                project_id,
                investor_id,
                amount,
            )
            .await?;
            txn.commit().await?;
            Ok(entry)
        })
        .await
    }

    pub async fn cancel_investment(
        &self,
        investment_id: Uuid,
        actor: &Actor,
    ) -> Result<investment::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let entry =
                ledger::cancel_investment(&txn, &self.settings.policy, investment_id, actor)
                    .await?;
            txn.commit().await?;
            Ok(entry)
        })
        .await
    }

    pub async fn list_investments(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<investment::Model>, AppError> {
        aggregate::find_project(&self.db, project_id).await?;
        ledger::list_investments(&self.db, project_id).await
    }

    pub async fn total_raised(&self, project_id: Uuid) -> Result<i64, AppError> {
        ledger::total_raised(&self.db, project_id).await
    }

    pub async fn investor_count(&self, project_id: Uuid) -> Result<u64, AppError> {
        aggregate::find_project(&self.db, project_id).await?;
        ledger::investor_count(&self.db, project_id).await
    }

    // --- Funding gate ---

    pub async fn can_request_unlock(&self, project_id: Uuid) -> Result<GateDecision, AppError> {
        let project = aggregate::find_project(&self.db, project_id).await?;
        let state = aggregate::ProjectState::load(&self.db, project).await?;
        Ok(gate::can_request_unlock(&self.settings.policy, &state))
    }

    // --- Unlock requests ---

    pub async fn request_unlock(
        &self,
        project_id: Uuid,
        actor: &Actor,
    ) -> Result<UnlockRequestReceipt, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let receipt =
                unlock::request_unlock(&txn, &self.settings.policy, project_id, actor).await?;
            txn.commit().await?;
            Ok(receipt)
        })
        .await
    }

    pub async fn decide(
        &self,
        request_id: Uuid,
        actor: &Actor,
        action: DecisionAction,
        note: Option<String>,
    ) -> Result<fund_unlock_request::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || {
            let note = note.clone();
            async move {
                let txn = self.begin().await?;
                let request = decisions::decide(
                    &txn,
                    &self.settings.policy,
                    self.escrow.as_ref(),
                    &self.settings.escrow_retry,
                    request_id,
                    actor,
                    action,
                    note,
                )
                .await?;
                txn.commit().await?;
                Ok(request)
            }
        })
        .await
    }

    pub async fn list_unlock_requests(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<fund_unlock_request::Model>, AppError> {
        aggregate::find_project(&self.db, project_id).await?;
        unlock::list_unlock_requests(&self.db, project_id).await
    }

    pub async fn pending_unlock_requests(
        &self,
        actor: &Actor,
    ) -> Result<Vec<fund_unlock_request::Model>, AppError> {
        actor.require_admin()?;
        unlock::pending_unlock_requests(&self.db).await
    }

    // --- Proofs ---

    pub async fn submit_proof(
        &self,
        project_id: Uuid,
        milestone_id: Uuid,
        actor: &Actor,
        description: &str,
        file_ref: &str,
    ) -> Result<milestone_proof::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || async move {
            let txn = self.begin().await?;
            let proof = proofs::submit_proof(
                &txn,
                project_id,
                milestone_id,
                actor,
                description,
                file_ref,
            )
            .await?;
            txn.commit().await?;
            Ok(proof)
        })
        .await
    }

    pub async fn resolve_proof(
        &self,
        proof_id: Uuid,
        actor: &Actor,
        decision: ProofDecision,
        admin_response: Option<String>,
    ) -> Result<milestone_proof::Model, AppError> {
        aggregate::retry_transient(self.settings.stale_write_attempts, move || {
            let admin_response = admin_response.clone();
            async move {
                let txn = self.begin().await?;
                let proof = proofs::resolve_proof(
                    &txn,
                    &self.settings.policy,
                    proof_id,
                    actor,
                    decision,
                    admin_response,
                )
                .await?;
                txn.commit().await?;
                Ok(proof)
            }
        })
        .await
    }

    pub async fn needs_proof_for_milestone(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProofRequirement>, AppError> {
        proofs::needs_proof_for_milestone(&self.db, project_id).await
    }

    pub async fn list_proofs(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<milestone_proof::Model>, AppError> {
        aggregate::find_project(&self.db, project_id).await?;
        proofs::list_proofs(&self.db, project_id).await
    }
}
