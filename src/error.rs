use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::gate::IneligibleReason;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not eligible: {0}")]
    NotEligible(IneligibleReason),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Out of sequence: {0}")]
    Sequence(String),
    #[error("Milestone schedule is immutable once funding or unlock requests have begun")]
    ImmutableSchedule,
    #[error("Escrow release failed: {0}")]
    ReleaseFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Lost a compare-and-set on the project aggregate. Retried internally;
    /// callers only see it as `Conflict` once retries run out.
    #[error("Project {0} was modified concurrently")]
    StaleAggregate(Uuid),
    #[error("Storage error: {0}")]
    Storage(DbErr),
}

impl AppError {
    /// Machine-readable error kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) | AppError::StaleAggregate(_) => "conflict_error",
            AppError::NotEligible(_) => "not_eligible_error",
            AppError::Forbidden(_) => "forbidden_error",
            AppError::Sequence(_) => "sequence_error",
            AppError::ImmutableSchedule => "immutable_schedule_error",
            AppError::ReleaseFailed(_) => "release_failed_error",
            AppError::NotFound(_) => "not_found_error",
            AppError::Unauthorized(_) => "unauthorized_error",
            AppError::Storage(_) => "storage_error",
        }
    }

    /// Failures worth re-running the whole command for: a lost
    /// compare-and-set, or a dropped or unavailable database connection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::StaleAggregate(_)
                | AppError::Storage(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::StaleAggregate(_) => StatusCode::CONFLICT,
            AppError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Sequence(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ImmutableSchedule => StatusCode::CONFLICT,
            AppError::ReleaseFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        // The partial unique index on pending requests is the last line of
        // defence against a second pending request; report it as a conflict.
        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return AppError::Conflict(msg);
        }
        AppError::Storage(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        }

        let body = match &self {
            AppError::NotEligible(reason) => json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "reason": reason,
            }),
            _ => json!({
                "error": self.to_string(),
                "kind": self.kind(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
