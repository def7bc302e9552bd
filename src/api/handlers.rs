use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::responses::{ApiResponse, HealthResponse, ServiceHealth};
use crate::coordinator::{HandlerOutcome, IdempotentResponse, MetricsSnapshot};
use crate::error::AppError;

use super::routes::AppState;

/// Payment submission endpoint, guarded by the idempotency coordinator.
///
/// The idempotency key travels in a request header (name configurable,
/// `Idempotency-Key` by default). Replays return the captured status code
/// and body verbatim.
pub async fn submit_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<serde_json::Value>>,
) -> Result<Response, AppError> {
    let key = headers
        .get(state.header_name.as_str())
        .and_then(|value| value.to_str().ok());
    let payload = payload.map(|Json(value)| value);

    let response = state.coordinator.execute(key, payload).await?;

    let (status_code, body) = match response {
        IdempotentResponse::Replayed(outcome) => (outcome.status_code, outcome.body),
        IdempotentResponse::Fresh(HandlerOutcome::Cacheable { status_code, body }) => {
            (status_code, body)
        }
        IdempotentResponse::Fresh(HandlerOutcome::Opaque(value)) => (200, value),
    };

    let status = StatusCode::from_u16(status_code).map_err(|_| {
        AppError::Internal(anyhow::anyhow!("invalid captured status code {}", status_code))
    })?;

    Ok((status, Json(body)).into_response())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let store_healthy = state.store_healthy().await;

    let response = HealthResponse {
        status: if store_healthy { "healthy".to_string() } else { "degraded".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        services: ServiceHealth {
            store: store_healthy,
        },
    };

    Json(ApiResponse::success(response))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.store_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics exposition.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not enabled").into_response(),
    }
}

/// In-process coordinator counters, for quick operational inspection.
pub async fn stats_endpoint(State(state): State<AppState>) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::success(state.coordinator.metrics().snapshot()))
}
