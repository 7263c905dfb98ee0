use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::entities::investment;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordInvestmentRequest {
    /// Amount in minor currency units
    pub amount: i64,
}

#[utoipa::path(
    post,
    path = "/projects/{id}/investments",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = RecordInvestmentRequest,
    responses(
        (status = 201, description = "Ledger entry appended", body = investment::Model),
        (status = 400, description = "Non-positive amount or inactive project"),
        (status = 403, description = "Caller is not an investor")
    )
)]
pub async fn record_investment(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    actor: Actor,
    Json(body): Json<RecordInvestmentRequest>,
) -> Result<(StatusCode, Json<investment::Model>), AppError> {
    if actor.role != Role::Investor {
        return Err(AppError::Forbidden(format!(
            "{} '{}' cannot invest",
            actor.role, actor.id
        )));
    }
    let entry = state
        .service
        .record_investment(project_id, &actor.id, body.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/investments",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Ledger entries, oldest first", body = Vec<investment::Model>),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn list_investments(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<investment::Model>>, AppError> {
    Ok(Json(state.service.list_investments(project_id).await?))
}

#[utoipa::path(
    post,
    path = "/investments/{id}/cancel",
    params(("id" = Uuid, Path, description = "Investment id")),
    responses(
        (status = 200, description = "Compensating entry appended", body = investment::Model),
        (status = 403, description = "Caller is neither the investor nor an admin"),
        (status = 409, description = "Already cancelled, or funds already released")
    )
)]
pub async fn cancel_investment(
    State(state): State<AppState>,
    Path(investment_id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<investment::Model>, AppError> {
    Ok(Json(state.service.cancel_investment(investment_id, &actor).await?))
}
