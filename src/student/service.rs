//! Service layer the HTTP handlers delegate to.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{ListParams, Student, StudentId};
use crate::error::ServiceError;

/// Result of a service call.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Shared handle to a service implementation.
pub type SharedStudentService = Arc<dyn StudentService>;

/// Business operations on the students resource.
///
/// Implementations own the data store and every business rule; callers only
/// forward what they received.
#[async_trait]
pub trait StudentService: Send + Sync {
    /// Fetch all students matching `params`, in the order the store returns them.
    async fn get_all_students(&self, params: &ListParams) -> ServiceResult<Vec<Student>>;

    /// Fetch one student. `None` when no student has this id.
    async fn get_student_detail(&self, id: &StudentId) -> ServiceResult<Option<Student>>;

    /// Add a student from an unvalidated payload.
    async fn add_new_student(&self, payload: Value) -> ServiceResult<Value>;

    /// Update a student from an unvalidated payload.
    async fn update_student(&self, id: &StudentId, payload: Value) -> ServiceResult<Value>;

    /// Change a student's status.
    async fn set_student_status(&self, id: &StudentId, status: Value) -> ServiceResult<Value>;
}
