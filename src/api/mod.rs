//! HTTP API module for the students endpoints, health and metrics.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::{create_router, create_router_with_limits, HttpLimits};
