use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::responses::{ApiResponse, ErrorResponse};

pub type Result<T> = std::result::Result<T, AppError>;

/// Application-level error taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    /// The caller omitted the idempotency key header, or it was blank.
    #[error("idempotency key is missing or blank")]
    MissingKey,

    /// The same idempotency key was reused with a different request payload.
    #[error("idempotency key reused with a different request payload")]
    PayloadMismatch,

    /// Another execution for this idempotency key is currently in flight.
    #[error("a request with this idempotency key is already being processed")]
    ConcurrentExecution,

    #[error("validation error: {0}")]
    Validation(String),

    /// Opaque failure from the wrapped business handler. Propagated
    /// unchanged, never cached.
    #[error("handler error: {0}")]
    Handler(#[source] anyhow::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A backing store was unreachable or misbehaved. The request fails
    /// rather than silently bypassing idempotency protection.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingKey | AppError::PayloadMismatch | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::ConcurrentExecution => StatusCode::CONFLICT,
            AppError::Handler(_) => StatusCode::BAD_GATEWAY,
            AppError::Redis(_) | AppError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingKey => "MISSING_IDEMPOTENCY_KEY",
            AppError::PayloadMismatch => "PAYLOAD_MISMATCH",
            AppError::ConcurrentExecution => "CONCURRENT_EXECUTION",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Handler(_) => "HANDLER_ERROR",
            AppError::Redis(_) | AppError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not in the response body.
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "An internal error occurred".to_string()
            }
            AppError::Redis(e) => {
                tracing::error!("redis error: {}", e);
                "A backing store is unavailable".to_string()
            }
            AppError::Infrastructure(msg) => {
                tracing::error!("infrastructure error: {}", msg);
                "A backing store is unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiResponse::<()>::error(ErrorResponse::new(self.error_code(), message));
        (status, Json(body)).into_response()
    }
}
