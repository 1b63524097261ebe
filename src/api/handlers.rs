//! HTTP API handlers.
//!
//! Every student handler follows the same shape: extract the input, call the
//! service exactly once, answer with its result as JSON. Service failures are
//! returned as [`ApiError`] and rendered by its `IntoResponse` impl.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::metrics;
use crate::student::{
    ListParams, Operation, ServiceResult, SharedStudentService, StatusChange, Student, StudentId,
    StudentList,
};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service layer every student handler delegates to.
    pub students: SharedStudentService,
    /// Whether the server is accepting traffic.
    pub ready: Arc<AtomicBool>,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state around a service.
    pub fn new(students: SharedStudentService) -> Self {
        Self {
            students,
            ready: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Expose metrics through this handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Count the request and turn a service failure into an [`ApiError`].
fn observe<T>(operation: Operation, result: ServiceResult<T>) -> Result<T, ApiError> {
    result.map_err(|e| {
        metrics::inc_student_request_failure(operation);
        ApiError::from(e)
    })
}

/// `GET /students` - list students, query parameters forwarded as filters.
pub async fn list_students(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<StudentList>, ApiError> {
    metrics::inc_student_request(Operation::ListStudents);
    let Query(params) = params?;

    let students = observe(
        Operation::ListStudents,
        state.students.get_all_students(&params).await,
    )?;

    Ok(Json(StudentList { students }))
}

/// `GET /students/:id` - one student, 404 when the service has none.
pub async fn get_student_detail(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Student>, ApiError> {
    metrics::inc_student_request(Operation::GetStudentDetail);
    let Path(id) = id?;
    let id = StudentId::from(id);

    let student = observe(
        Operation::GetStudentDetail,
        state.students.get_student_detail(&id).await,
    )?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;

    Ok(Json(student))
}

/// `POST /students` - add a student.
pub async fn add_student(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    metrics::inc_student_request(Operation::AddStudent);
    let Json(payload) = payload?;

    let result = observe(
        Operation::AddStudent,
        state.students.add_new_student(payload).await,
    )?;

    Ok(Json(result))
}

/// `PUT|PATCH /students/:id` - update a student.
pub async fn update_student(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    metrics::inc_student_request(Operation::UpdateStudent);
    let Path(id) = id?;
    let id = StudentId::from(id);
    let Json(payload) = payload?;

    let result = observe(
        Operation::UpdateStudent,
        state.students.update_student(&id, payload).await,
    )?;

    Ok(Json(result))
}

/// `PATCH /students/:id/status` - change a student's status.
pub async fn set_student_status(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    change: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    metrics::inc_student_request(Operation::SetStudentStatus);
    let Path(id) = id?;
    let id = StudentId::from(id);
    let Json(StatusChange { status }) = change?;

    let result = observe(
        Operation::SetStudentStatus,
        state.students.set_student_status(&id, status).await,
    )?;

    Ok(Json(result))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Prometheus scrape endpoint - 404 when metrics are disabled.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
