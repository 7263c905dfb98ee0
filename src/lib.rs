use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod db;
pub mod decisions;
pub mod entities;
pub mod error;
pub mod escrow;
pub mod gate;
pub mod ledger;
pub mod projects;
pub mod proofs;
pub mod routes;
pub mod schedule;
pub mod service;
pub mod unlock;

pub use error::AppError;
pub use service::{FundingService, ServiceSettings};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FundingService>,
}

impl AppState {
    pub fn new(service: FundingService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Requests per minute per client IP on the API routes. `None` disables the limiter.
    pub rate_limit_per_minute: Option<NonZeroU32>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Service is healthy")
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fundgate API",
        version = "0.1.0",
        description = "Milestone-gated investment funding with escrowed fund releases"
    ),
    paths(
        health_check,
        routes::projects::create_project,
        routes::projects::get_project,
        routes::projects::review_project,
        routes::projects::publish_schedule,
        routes::projects::funding_stats,
        routes::ledger::record_investment,
        routes::ledger::list_investments,
        routes::ledger::cancel_investment,
        routes::unlock::request_unlock,
        routes::unlock::list_unlock_requests,
        routes::unlock::pending_unlock_requests,
        routes::unlock::decide,
        routes::proofs::submit_proof,
        routes::proofs::list_proofs,
        routes::proofs::needed_proof,
        routes::proofs::resolve_proof
    ),
    components(schemas(
        entities::project::Model,
        entities::milestone::Model,
        entities::investment::Model,
        entities::fund_unlock_request::Model,
        entities::milestone_proof::Model,
        entities::ProjectStatus,
        entities::MilestoneStatus,
        entities::InvestmentStatus,
        entities::RequestStatus,
        entities::ProofStatus,
        gate::GateDecision,
        gate::IneligibleReason,
        projects::NewProject,
        projects::ReviewAction,
        projects::ProjectOverview,
        projects::FundingStats,
        schedule::MilestoneDraft,
        schedule::ScheduleWarning,
        schedule::PublishedSchedule,
        proofs::ProofDecision,
        proofs::ProofRequirement,
        decisions::DecisionAction,
        unlock::UnlockRequestReceipt,
        routes::projects::ReviewProjectRequest,
        routes::projects::PublishScheduleRequest,
        routes::ledger::RecordInvestmentRequest,
        routes::unlock::DecisionRequest,
        routes::proofs::SubmitProofRequest,
        routes::proofs::ProofDecisionRequest
    ))
)]
pub struct ApiDoc;

/// Create the application with all routes and middleware
pub fn create_app(state: AppState, options: AppOptions) -> anyhow::Result<Router> {
    let api_doc = ApiDoc::openapi();

    let mut api_routes = routes::api_routes().route("/health", get(health_check));

    if let Some(per_minute) = options.rate_limit_per_minute {
        let governor_conf = GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .period(Duration::from_secs(60) / per_minute.get())
            .burst_size(per_minute.get())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {} per minute", per_minute))?;
        tracing::info!(per_minute = per_minute.get(), "rate limiting enabled");
        // Only the API routes are limited, not the docs
        api_routes = api_routes.layer(GovernorLayer {
            config: Arc::new(governor_conf),
        });
    }

    let docs_router = SwaggerUi::new("/docs").url("/api-doc/openapi.json", api_doc);

    let app = Router::new()
        .merge(api_routes.with_state(state))
        .merge(docs_router)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Ok(app)
}
