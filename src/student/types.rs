//! Student resource types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, IntoStaticStr};

/// Identifier taken from the `:id` route parameter.
///
/// Passed to the service layer untouched; the backend decides what a valid id
/// looks like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StudentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A student record as produced by the service layer.
///
/// The schema is owned by the backend, so the record is kept as a JSON object
/// and re-encoded exactly as it was received. Only `id` and `status` have
/// typed accessors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Student(Map<String, Value>);

impl Student {
    /// Build a student from a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// The student's identifier. Numeric ids are rendered as strings.
    pub fn id(&self) -> Option<StudentId> {
        match self.0.get("id")? {
            Value::String(id) => Some(StudentId::new(id.as_str())),
            Value::Number(id) => Some(StudentId::new(id.to_string())),
            _ => None,
        }
    }

    /// The student's status field, in whatever shape the backend uses.
    pub fn status(&self) -> Option<&Value> {
        self.0.get("status")
    }

    /// Look up an arbitrary field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }
}

/// Query parameters of the list endpoint, forwarded as filter options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListParams(BTreeMap<String, String>);

impl ListParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Body of the set-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// New status, forwarded verbatim.
    pub status: Value,
}

/// Response envelope of the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentList {
    /// Students in the order the service returned them.
    pub students: Vec<Student>,
}

/// Service operations, used as metric labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    ListStudents,
    GetStudentDetail,
    AddStudent,
    UpdateStudent,
    SetStudentStatus,
    Login,
}

impl Operation {
    /// Static label for this operation.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
