//! JSON HTTP gateway for the students resource.
//!
//! Five handlers sit between the router and a student service: list, detail,
//! add, update and set-status. Each one extracts its input, calls the service
//! once and answers with the result as JSON:
//!
//! ```text
//! GET   /api/v1/students             -> { "students": [...] }
//! GET   /api/v1/students/:id         -> <student>
//! POST  /api/v1/students             -> <service result>
//! PUT   /api/v1/students/:id         -> <service result>
//! PATCH /api/v1/students/:id/status  -> <service result>
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`student`]: Student types, service trait, backend client and mock
//! - [`api`]: HTTP handlers and router
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod student;
pub mod utils;

pub use config::Config;
pub use error::{ApiError, GatewayError, Result, ServiceError};
