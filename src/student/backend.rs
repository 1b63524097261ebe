//! HTTP client for the upstream student backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use super::service::{ServiceResult, StudentService};
use super::types::{ListParams, Operation, Student, StudentId};
use crate::config::Config;
use crate::error::{GatewayError, ServiceError};
use crate::metrics;

/// Name of the access token cookie issued by the backend.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Name of the refresh token cookie issued by the backend.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
/// Name of the CSRF token cookie issued by the backend.
pub const CSRF_TOKEN_COOKIE: &str = "csrfToken";
/// Header that must echo the CSRF cookie on every authenticated call.
pub const CSRF_HEADER: &str = "x-csrf-token";

const SESSION_COOKIES: [&str; 3] = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, CSRF_TOKEN_COOKIE];
const API_PREFIX: [&str; 2] = ["api", "v1"];

/// Service account used to log in to the backend.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session cookies issued by the backend login endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Keep only the session cookies, skipping empty values.
    pub fn from_cookies<I, N, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let cookies = cookies
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .filter(|(name, value)| !value.is_empty() && SESSION_COOKIES.contains(&name.as_str()))
            .collect();
        Self { cookies }
    }

    /// Value of the CSRF cookie, if the backend issued one.
    pub fn csrf_token(&self) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(name, _)| name == CSRF_TOKEN_COOKIE)
            .map(|(_, value)| value.as_str())
    }

    /// `Cookie` header value carrying the whole session.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }
}

/// Student backend client.
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Backend base URL.
    base_url: Url,
    /// Service account, if the backend requires one.
    credentials: Option<Credentials>,
    /// Current session, created on first use.
    session: Arc<RwLock<Option<Session>>>,
}

impl BackendClient {
    /// Create a backend client from config.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        Self::with_settings(
            config.backend_base_url()?,
            config.backend_credentials(),
            config.http_timeout(),
        )
    }

    /// Create a backend client from explicit settings.
    pub fn with_settings(
        base_url: Url,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidConfig(format!(
                "backend url {base_url} cannot be used as a base"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url,
            credentials,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether a service account is configured.
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Build `{base}/api/v1/{segments...}`, percent-encoding each segment.
    ///
    /// `.` and `..` are refused: the url crate drops them from the path,
    /// which would send the request to a different backend resource.
    fn endpoint(&self, segments: &[&str]) -> ServiceResult<Url> {
        if let Some(segment) = segments.iter().find(|s| matches!(**s, "." | "..")) {
            return Err(ServiceError::InvalidInput(format!(
                "`{segment}` is not a valid path segment"
            )));
        }

        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ServiceError::InvalidInput(format!("backend url {} cannot be a base", self.base_url))
            })?;
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        Ok(url)
    }

    /// Log in with the service account and collect the session cookies.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> ServiceResult<Session> {
        let url = self.endpoint(&["auth", "login"])?;
        let body = json!({
            "username": credentials.username,
            "password": credentials.password,
        });

        let started = Instant::now();
        let response = self.http.post(url).json(&body).send().await?;
        metrics::record_backend_latency(started, Operation::Login);
        metrics::inc_backend_logins();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Unauthorized(body));
        }

        let session = Session::from_cookies(
            response
                .cookies()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string())),
        );
        debug!(cookies = session.len(), "Backend session established");

        Ok(session)
    }

    /// Current session, logging in first if there is none yet.
    async fn session(&self) -> ServiceResult<Option<Session>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(Some(session.clone()));
        }

        let mut slot = self.session.write().await;
        // Another request may have logged in while we waited for the lock.
        if let Some(session) = slot.as_ref() {
            return Ok(Some(session.clone()));
        }

        let session = self.login(credentials).await?;
        *slot = Some(session.clone());
        Ok(Some(session))
    }

    /// Drop `stale` unless it was already replaced.
    async fn invalidate_session(&self, stale: &Session) {
        let mut slot = self.session.write().await;
        if slot.as_ref() == Some(stale) {
            *slot = None;
        }
    }

    /// Send a request with the session attached, logging in again once on 401.
    async fn send(
        &self,
        operation: Operation,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> ServiceResult<reqwest::Response> {
        let session = self.session().await?;
        let response = self
            .dispatch(operation, &method, &url, body, session.as_ref())
            .await?;

        match session {
            Some(stale) if response.status() == StatusCode::UNAUTHORIZED => {
                warn!(operation = %operation, "Backend rejected session, logging in again");
                self.invalidate_session(&stale).await;
                let fresh = self.session().await?;
                self.dispatch(operation, &method, &url, body, fresh.as_ref())
                    .await
            }
            _ => Ok(response),
        }
    }

    async fn dispatch(
        &self,
        operation: Operation,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        session: Option<&Session>,
    ) -> ServiceResult<reqwest::Response> {
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(session) = session {
            request = request.header(header::COOKIE, session.cookie_header());
            if let Some(token) = session.csrf_token() {
                request = request.header(CSRF_HEADER, token);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await;
        metrics::record_backend_latency(started, operation);

        Ok(response?)
    }
}

/// Decode a success body, or turn the status into an error.
async fn read_json(response: reqwest::Response, what: &str) -> ServiceResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode(format!("{what}: {e}")))
}

/// Accept either a bare array or an object carrying a `students` array.
fn students_from_value(value: Value) -> ServiceResult<Vec<Student>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("students") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ServiceError::Decode(
                    "student list: expected a `students` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(ServiceError::Decode(
                "student list: expected an array".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| {
            Student::from_value(item).ok_or_else(|| {
                ServiceError::Decode("student list: entry is not an object".to_string())
            })
        })
        .collect()
}

#[async_trait]
impl StudentService for BackendClient {
    #[instrument(skip(self))]
    async fn get_all_students(&self, params: &ListParams) -> ServiceResult<Vec<Student>> {
        let mut url = self.endpoint(&["students"])?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }

        let response = self
            .send(Operation::ListStudents, Method::GET, url, None)
            .await?;
        let students = students_from_value(read_json(response, "student list").await?)?;
        debug!(count = students.len(), "Fetched students");

        Ok(students)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_student_detail(&self, id: &StudentId) -> ServiceResult<Option<Student>> {
        let url = self.endpoint(&["students", id.as_str()])?;
        let response = self
            .send(Operation::GetStudentDetail, Method::GET, url, None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Student not found");
            return Ok(None);
        }

        match read_json(response, "student").await? {
            Value::Null => Ok(None),
            value => Student::from_value(value)
                .map(Some)
                .ok_or_else(|| ServiceError::Decode("student: expected an object".to_string())),
        }
    }

    #[instrument(skip(self, payload))]
    async fn add_new_student(&self, payload: Value) -> ServiceResult<Value> {
        let url = self.endpoint(&["students"])?;
        let response = self
            .send(Operation::AddStudent, Method::POST, url, Some(&payload))
            .await?;
        read_json(response, "add student result").await
    }

    #[instrument(skip(self, payload), fields(id = %id))]
    async fn update_student(&self, id: &StudentId, payload: Value) -> ServiceResult<Value> {
        let url = self.endpoint(&["students", id.as_str()])?;
        let response = self
            .send(Operation::UpdateStudent, Method::PUT, url, Some(&payload))
            .await?;
        read_json(response, "update student result").await
    }

    #[instrument(skip(self, status), fields(id = %id))]
    async fn set_student_status(&self, id: &StudentId, status: Value) -> ServiceResult<Value> {
        let url = self.endpoint(&["students", id.as_str(), "status"])?;
        let body = json!({ "status": status });
        let response = self
            .send(Operation::SetStudentStatus, Method::POST, url, Some(&body))
            .await?;
        read_json(response, "student status result").await
    }
}
