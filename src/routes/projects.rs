use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::project;
use crate::error::AppError;
use crate::projects::{FundingStats, NewProject, ProjectOverview, ReviewAction};
use crate::schedule::{MilestoneDraft, PublishedSchedule};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewProjectRequest {
    pub action: ReviewAction,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishScheduleRequest {
    /// Ordered milestone plan; positions start at 1 without gaps
    pub milestones: Vec<MilestoneDraft>,
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = NewProject,
    responses(
        (status = 201, description = "Draft project created", body = project::Model),
        (status = 400, description = "Empty title or non-positive goal"),
        (status = 403, description = "Caller is not an artist")
    ),
    description = "Creates a draft project owned by the calling artist."
)]
pub async fn create_project(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<project::Model>), AppError> {
    let project = state.service.create_project(&actor, body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project with its milestone schedule", body = ProjectOverview),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectOverview>, AppError> {
    Ok(Json(state.service.project_overview(project_id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/review",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ReviewProjectRequest,
    responses(
        (status = 200, description = "Project activated or rejected", body = project::Model),
        (status = 400, description = "No milestone schedule published yet"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Project was already reviewed")
    )
)]
pub async fn review_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    actor: Actor,
    Json(body): Json<ReviewProjectRequest>,
) -> Result<Json<project::Model>, AppError> {
    Ok(Json(state.service.review_project(project_id, &actor, body.action).await?))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/milestones",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = PublishScheduleRequest,
    responses(
        (
            status = 200,
            description = "Schedule published, with goal warnings",
            body = PublishedSchedule
        ),
        (status = 400, description = "Invalid ordering, names or amounts"),
        (status = 403, description = "Caller does not own the project"),
        (status = 409, description = "Funding or unlock requests have already begun")
    ),
    description = "Publishes or replaces the milestone schedule. \
        Allowed until the first investment or unlock request is recorded."
)]
pub async fn publish_schedule(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    actor: Actor,
    Json(body): Json<PublishScheduleRequest>,
) -> Result<Json<PublishedSchedule>, AppError> {
    Ok(Json(
        state
            .service
            .publish_schedule(project_id, &actor, &body.milestones)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/funding-stats",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Funding progress and eligibility", body = FundingStats),
        (status = 404, description = "Unknown project")
    )
)]
pub async fn funding_stats(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<FundingStats>, AppError> {
    Ok(Json(state.service.funding_stats(project_id).await?))
}
