use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::decisions::DecisionAction;
use crate::entities::fund_unlock_request;
use crate::error::AppError;
use crate::unlock::UnlockRequestReceipt;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub action: DecisionAction,
    /// Optional note shown to the artist
    pub note: Option<String>,
}

#[utoipa::path(
    post,
    path = "/projects/{id}/unlock-requests",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 201, description = "Pending unlock request created", body = UnlockRequestReceipt),
        (status = 403, description = "Caller does not own the project"),
        (status = 409, description = "A request is already pending"),
        (status = 422, description = "Funding gate refused; body carries the reason")
    ),
    description = "Requests release of the next milestone's funds. \
        The funding gate decides which milestone."
)]
pub async fn request_unlock(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    actor: Actor,
) -> Result<(StatusCode, Json<UnlockRequestReceipt>), AppError> {
    let receipt = state.service.request_unlock(project_id, &actor).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/unlock-requests",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (
            status = 200,
            description = "Request history, oldest first",
            body = Vec<fund_unlock_request::Model>
        ),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn list_unlock_requests(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<fund_unlock_request::Model>>, AppError> {
    Ok(Json(state.service.list_unlock_requests(project_id).await?))
}

#[utoipa::path(
    get,
    path = "/unlock-requests/pending",
    responses(
        (
            status = 200,
            description = "Admin queue of pending requests",
            body = Vec<fund_unlock_request::Model>
        ),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn pending_unlock_requests(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<fund_unlock_request::Model>>, AppError> {
    Ok(Json(state.service.pending_unlock_requests(&actor).await?))
}

#[utoipa::path(
    post,
    path = "/unlock-requests/{id}/decision",
    params(("id" = Uuid, Path, description = "Unlock request id")),
    request_body = DecisionRequest,
    responses(
        (
            status = 200,
            description = "Request approved (funds released) or rejected",
            body = fund_unlock_request::Model
        ),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request was already decided"),
        (status = 422, description = "Approval refused: funding gate no longer passes"),
        (status = 502, description = "Escrow release failed; request is still pending")
    )
)]
pub async fn decide(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    actor: Actor,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<fund_unlock_request::Model>, AppError> {
    Ok(Json(
        state
            .service
            .decide(request_id, &actor, body.action, body.note)
            .await?,
    ))
}
