use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::coordinator::IdempotencyCoordinator;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub header_name: String,
    pub redis_client: Option<redis::Client>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(coordinator: Arc<IdempotencyCoordinator>, header_name: impl Into<String>) -> Self {
        Self {
            coordinator,
            header_name: header_name.into(),
            redis_client: None,
            metrics_handle: None,
        }
    }

    /// Adds the Redis client used for health probes when the gateway runs
    /// against the Redis backend.
    pub fn with_redis_client(mut self, client: redis::Client) -> Self {
        self.redis_client = Some(client);
        self
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Probes the backing store. The in-memory backend is always healthy.
    pub async fn store_healthy(&self) -> bool {
        match &self.redis_client {
            Some(client) => client.get_multiplexed_async_connection().await.is_ok(),
            None => true,
        }
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Payment endpoint
        .route("/payments", post(handlers::submit_payment))
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoints
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/stats", get(handlers::stats_endpoint))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(
            tower_http::request_id::MakeRequestUuid,
        ))
        .with_state(state)
}
