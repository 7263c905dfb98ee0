use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::milestone_proof;
use crate::error::AppError;
use crate::proofs::{ProofDecision, ProofRequirement};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitProofRequest {
    pub description: String,
    /// Opaque reference to the uploaded evidence
    pub file_ref: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProofDecisionRequest {
    pub decision: ProofDecision,
    pub admin_response: Option<String>,
}

#[utoipa::path(
    post,
    path = "/projects/{id}/milestones/{milestone_id}/proofs",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("milestone_id" = Uuid, Path, description = "Released milestone id")
    ),
    request_body = SubmitProofRequest,
    responses(
        (status = 201, description = "Proof submitted for review", body = milestone_proof::Model),
        (status = 400, description = "Missing description or file reference"),
        (status = 403, description = "Caller does not own the project"),
        (status = 422, description = "Not the latest released milestone, or proof under review")
    )
)]
pub async fn submit_proof(
    State(state): State<AppState>,
    Path((project_id, milestone_id)): Path<(Uuid, Uuid)>,
    actor: Actor,
    Json(body): Json<SubmitProofRequest>,
) -> Result<(StatusCode, Json<milestone_proof::Model>), AppError> {
    let proof = state
        .service
        .submit_proof(project_id, milestone_id, &actor, &body.description, &body.file_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(proof)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/proofs",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Proofs, oldest first", body = Vec<milestone_proof::Model>),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn list_proofs(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<milestone_proof::Model>>, AppError> {
    Ok(Json(state.service.list_proofs(project_id).await?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/proofs/needed",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (
            status = 200,
            description = "Milestone awaiting an approved proof, or null",
            body = Option<ProofRequirement>
        ),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn needed_proof(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Option<ProofRequirement>>, AppError> {
    Ok(Json(state.service.needs_proof_for_milestone(project_id).await?))
}

#[utoipa::path(
    post,
    path = "/proofs/{id}/decision",
    params(("id" = Uuid, Path, description = "Proof id")),
    request_body = ProofDecisionRequest,
    responses(
        (status = 200, description = "Proof approved or rejected", body = milestone_proof::Model),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Proof was already reviewed")
    )
)]
pub async fn resolve_proof(
    State(state): State<AppState>,
    Path(proof_id): Path<Uuid>,
    actor: Actor,
    Json(body): Json<ProofDecisionRequest>,
) -> Result<Json<milestone_proof::Model>, AppError> {
    Ok(Json(
        state
            .service
            .resolve_proof(proof_id, &actor, body.decision, body.admin_response)
            .await?,
    ))
}
