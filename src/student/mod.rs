//! Students resource.
//!
//! This module handles:
//! - Student types and request/response shapes
//! - The service trait the HTTP handlers depend on
//! - The HTTP client for the upstream student backend
//! - Mock service for testing

pub mod backend;
pub mod mock;
pub mod service;
pub mod types;

pub use backend::{BackendClient, Credentials, Session};
pub use mock::{MockCall, MockConfig, MockStudentService};
pub use service::{ServiceResult, SharedStudentService, StudentService};
pub use types::{ListParams, Operation, StatusChange, Student, StudentId, StudentList};
