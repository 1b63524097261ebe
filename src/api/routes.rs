//! HTTP API route definitions.

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    routing::{get, patch},
    Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_student, get_student_detail, health, list_students, prometheus_metrics, ready,
    set_student_status, update_student, AppState,
};
use crate::config::Config;
use crate::error::handle_middleware_error;

/// Limits applied to every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpLimits {
    /// Time allowed to produce a response.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl HttpLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Student endpoints, relative to the API prefix.
pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students).post(add_student))
        .route(
            "/students/:id",
            get(get_student_detail)
                .put(update_student)
                .patch(update_student),
        )
        .route("/students/:id/status", patch(set_student_status))
}

/// Create the API router with default limits.
pub fn create_router(state: AppState) -> Router {
    create_router_with_limits(state, HttpLimits::default())
}

/// Create the API router.
pub fn create_router_with_limits(state: AppState, limits: HttpLimits) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", student_routes())
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(limits.request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
