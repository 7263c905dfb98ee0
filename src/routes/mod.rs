// Export all route modules
pub mod ledger;
pub mod projects;
pub mod proofs;
pub mod unlock;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::AppState;

/// Every API route, without middleware or documentation.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(projects::create_project))
        .route("/projects/{id}", get(projects::get_project))
        .route("/projects/{id}/review", post(projects::review_project))
        .route("/projects/{id}/milestones", put(projects::publish_schedule))
        .route("/projects/{id}/funding-stats", get(projects::funding_stats))
        .route(
            "/projects/{id}/investments",
            post(ledger::record_investment).get(ledger::list_investments),
        )
        .route("/investments/{id}/cancel", post(ledger::cancel_investment))
        .route(
            "/projects/{id}/unlock-requests",
            post(unlock::request_unlock).get(unlock::list_unlock_requests),
        )
        .route("/unlock-requests/pending", get(unlock::pending_unlock_requests))
        .route("/unlock-requests/{id}/decision", post(unlock::decide))
        .route(
            "/projects/{id}/milestones/{milestone_id}/proofs",
            post(proofs::submit_proof),
        )
        .route("/projects/{id}/proofs", get(proofs::list_proofs))
        .route("/projects/{id}/proofs/needed", get(proofs::needed_proof))
        .route("/proofs/{id}/decision", post(proofs::resolve_proof))
}
