//! In-memory student service for unit testing.
//!
//! This module provides a service that keeps students in memory, records
//! every call it receives and can be told to fail, so handlers can be tested
//! without a running backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::service::{ServiceResult, StudentService};
use super::types::{ListParams, Student, StudentId};
use crate::error::ServiceError;

/// Configuration for mock service behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail list requests.
    pub fail_list: bool,
    /// Whether to fail detail requests.
    pub fail_detail: bool,
    /// Whether to fail add requests.
    pub fail_add: bool,
    /// Whether to fail update requests.
    pub fail_update: bool,
    /// Whether to fail status requests.
    pub fail_status: bool,
    /// Fixed result for add instead of the default acknowledgement.
    pub add_response: Option<Value>,
    /// Fixed result for update instead of the default acknowledgement.
    pub update_response: Option<Value>,
    /// Fixed result for status changes instead of the default acknowledgement.
    pub status_response: Option<Value>,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// A call received by the mock, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    GetAll(ListParams),
    Detail(StudentId),
    Add(Value),
    Update(StudentId, Value),
    SetStatus(StudentId, Value),
}

/// Mock student service for testing.
#[derive(Debug, Clone)]
pub struct MockStudentService {
    /// Mock configuration.
    config: MockConfig,
    /// Students in insertion order.
    students: Arc<Mutex<Vec<Student>>>,
    /// Every call received, oldest first.
    calls: Arc<Mutex<Vec<MockCall>>>,
    /// Next id handed out by add.
    next_id: Arc<AtomicU64>,
}

impl MockStudentService {
    /// Create an empty mock with default configuration.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a mock with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            students: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Seed the store.
    pub fn with_students(self, students: Vec<Student>) -> Self {
        Self {
            students: Arc::new(Mutex::new(students)),
            ..self
        }
    }

    /// Snapshot of the stored students.
    pub async fn students(&self) -> Vec<Student> {
        self.students.lock().await.clone()
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: MockCall) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
        self.calls.lock().await.push(call);
    }

    fn fail(operation: &str) -> ServiceError {
        ServiceError::Unavailable(format!("mock {operation} failure"))
    }
}

impl Default for MockStudentService {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a field for comparison against a query parameter.
fn field_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

#[async_trait]
impl StudentService for MockStudentService {
    async fn get_all_students(&self, params: &ListParams) -> ServiceResult<Vec<Student>> {
        self.record(MockCall::GetAll(params.clone())).await;
        if self.config.fail_list {
            return Err(Self::fail("list"));
        }

        // Each parameter is treated as an equality filter on the field of the same name.
        let students = self.students.lock().await;
        Ok(students
            .iter()
            .filter(|student| {
                params.iter().all(|(key, expected)| {
                    student
                        .get(key)
                        .map(|value| field_matches(value, expected))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect())
    }

    async fn get_student_detail(&self, id: &StudentId) -> ServiceResult<Option<Student>> {
        self.record(MockCall::Detail(id.clone())).await;
        if self.config.fail_detail {
            return Err(Self::fail("detail"));
        }

        let students = self.students.lock().await;
        Ok(students
            .iter()
            .find(|student| student.id().as_ref() == Some(id))
            .cloned())
    }

    async fn add_new_student(&self, payload: Value) -> ServiceResult<Value> {
        self.record(MockCall::Add(payload.clone())).await;
        if self.config.fail_add {
            return Err(Self::fail("add"));
        }

        let mut student = Student::from_value(payload).ok_or_else(|| {
            ServiceError::InvalidInput("student payload must be a JSON object".to_string())
        })?;
        let id = match student.id() {
            Some(id) => id,
            None => {
                let id = StudentId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
                student
                    .fields_mut()
                    .insert("id".to_string(), Value::String(id.to_string()));
                id
            }
        };
        self.students.lock().await.push(student);

        Ok(self
            .config
            .add_response
            .clone()
            .unwrap_or_else(|| json!({ "message": "student added", "id": id })))
    }

    async fn update_student(&self, id: &StudentId, payload: Value) -> ServiceResult<Value> {
        self.record(MockCall::Update(id.clone(), payload.clone())).await;
        if self.config.fail_update {
            return Err(Self::fail("update"));
        }

        let Value::Object(changes) = payload else {
            return Err(ServiceError::InvalidInput(
                "student payload must be a JSON object".to_string(),
            ));
        };

        let mut students = self.students.lock().await;
        let student = students
            .iter_mut()
            .find(|student| student.id().as_ref() == Some(id))
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })?;
        for (field, value) in changes {
            // The id is the lookup key and stays fixed.
            if field != "id" {
                student.fields_mut().insert(field, value);
            }
        }

        Ok(self
            .config
            .update_response
            .clone()
            .unwrap_or_else(|| json!({ "message": "student updated", "student": student })))
    }

    async fn set_student_status(&self, id: &StudentId, status: Value) -> ServiceResult<Value> {
        self.record(MockCall::SetStatus(id.clone(), status.clone())).await;
        if self.config.fail_status {
            return Err(Self::fail("status"));
        }

        let mut students = self.students.lock().await;
        let student = students
            .iter_mut()
            .find(|student| student.id().as_ref() == Some(id))
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })?;
        student.fields_mut().insert("status".to_string(), status);

        Ok(self
            .config
            .status_response
            .clone()
            .unwrap_or_else(|| json!({ "message": "student status changed", "student": student })))
    }
}
