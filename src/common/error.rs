//! Crate-wide error type and its stable error-code taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authorization header is required")]
    AuthRequired,

    #[error("invalid or unknown API token")]
    InvalidToken,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("task not found")]
    TaskNotFound,

    #[error("task is already running")]
    TaskAlreadyRunning,

    #[error("task is already completed")]
    TaskAlreadyCompleted,

    #[error("invalid queue status: {0}")]
    InvalidQueueStatus(String),

    #[error("group not found")]
    GroupNotFound,

    #[error("training unit not found")]
    UnitNotFound,

    #[error("training queue not found")]
    QueueNotFound,

    #[error("queue belongs to a different training unit")]
    QueueCrossUnit,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("queue-index error")]
    Redis(#[from] redis::RedisError),
}

impl ApiError {
    /// Stable machine-readable code. Clients branch on this, not the message.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthRequired => "AUTH_REQUIRED",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::InvalidConfig(_) => "INVALID_CONFIG",
            ApiError::InvalidPriority(_) => "INVALID_PRIORITY",
            ApiError::TaskNotFound => "TASK_NOT_FOUND",
            ApiError::TaskAlreadyRunning => "TASK_ALREADY_RUNNING",
            ApiError::TaskAlreadyCompleted => "TASK_ALREADY_COMPLETED",
            ApiError::InvalidQueueStatus(_) => "INVALID_QUEUE_STATUS",
            ApiError::GroupNotFound => "GROUP_NOT_FOUND",
            ApiError::UnitNotFound => "UNIT_NOT_FOUND",
            ApiError::QueueNotFound => "QUEUE_NOT_FOUND",
            ApiError::QueueCrossUnit => "QUEUE_CROSS_UNIT",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Internal(_) | ApiError::Database(_) | ApiError::Redis(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthRequired | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidConfig(_)
            | ApiError::InvalidPriority(_)
            | ApiError::TaskAlreadyRunning
            | ApiError::TaskAlreadyCompleted
            | ApiError::InvalidQueueStatus(_)
            | ApiError::QueueCrossUnit
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::TaskNotFound
            | ApiError::GroupNotFound
            | ApiError::UnitNotFound
            | ApiError::QueueNotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Database(_) | ApiError::Redis(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Store/queue-index failures are logged with full detail server-side;
        // the client only ever sees INTERNAL_ERROR.
        match &self {
            ApiError::Database(e) => tracing::error!(error = %e, "store failure"),
            ApiError::Redis(e) => tracing::error!(error = %e, "queue-index failure"),
            ApiError::Internal(e) => tracing::error!(error = %e, "internal error"),
            _ => {}
        }

        let status = self.status();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
