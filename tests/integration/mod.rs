//! Integration tests for the students gateway.
//!
//! Each test starts a fake student backend on a local port, points a
//! [`BackendClient`] at it and drives the gateway router end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

use students_gateway::api::{create_router, AppState};
use students_gateway::student::{BackendClient, Credentials};

/// In-memory backend: students keyed by id, plus a login counter.
#[derive(Clone, Default)]
struct Backend {
    students: Arc<Mutex<Vec<Value>>>,
    logins: Arc<AtomicUsize>,
}

impl Backend {
    fn seeded() -> Self {
        let backend = Self::default();
        backend.students.lock().unwrap().extend([
            json!({"id": "1", "name": "Alice", "class": "10", "status": true}),
            json!({"id": "2", "name": "Bob", "class": "9", "status": true}),
        ]);
        backend
    }

    fn find(&self, id: &str) -> Option<Value> {
        self.students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s["id"] == id)
            .cloned()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let csrf = headers.get("x-csrf-token").and_then(|v| v.to_str().ok());
    cookie.contains("accessToken=token") && csrf == Some("csrf")
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.logins.fetch_add(1, Ordering::SeqCst);
    if body["username"] != "gateway" || body["password"] != "secret" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (
        AppendHeaders([
            (header::SET_COOKIE, "accessToken=token; Path=/; HttpOnly"),
            (header::SET_COOKIE, "refreshToken=refresh; Path=/; HttpOnly"),
            (header::SET_COOKIE, "csrfToken=csrf; Path=/"),
        ]),
        Json(json!({"message": "logged in"})),
    )
        .into_response()
}

async fn list(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let students: Vec<Value> = backend
        .students
        .lock()
        .unwrap()
        .iter()
        .filter(|s| params.iter().all(|(k, v)| s[k.as_str()] == v.as_str()))
        .cloned()
        .collect();
    Json(students).into_response()
}

async fn detail(State(backend): State<Backend>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match backend.find(&id) {
        Some(student) => Json(student).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
    }
}

async fn add(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body.get("name").is_none() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "name is required"})))
            .into_response();
    }
    let mut students = backend.students.lock().unwrap();
    let id = (students.len() + 1).to_string();
    let mut student = body;
    student["id"] = json!(id);
    students.push(student);
    (StatusCode::CREATED, Json(json!({"message": "student added", "id": id}))).into_response()
}

async fn update(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut students = backend.students.lock().unwrap();
    let Some(student) = students.iter_mut().find(|s| s["id"] == id.as_str()) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response();
    };
    if let (Some(target), Some(changes)) = (student.as_object_mut(), body.as_object()) {
        for (k, v) in changes {
            target.insert(k.clone(), v.clone());
        }
    }
    Json(json!({"message": "student updated", "student": student.clone()})).into_response()
}

async fn set_status(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut students = backend.students.lock().unwrap();
    let Some(student) = students.iter_mut().find(|s| s["id"] == id.as_str()) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response();
    };
    student["status"] = body["status"].clone();
    Json(json!({"message": "status updated", "status": body["status"]})).into_response()
}

async fn spawn_backend(backend: Backend) -> Url {
    let router = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/students", get(list).post(add))
        .route("/api/v1/students/:id", get(detail).put(update))
        .route("/api/v1/students/:id/status", post(set_status))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn gateway(backend: Backend, password: &str) -> Router {
    let url = spawn_backend(backend).await;
    let credentials = Credentials {
        username: "gateway".to_string(),
        password: password.to_string(),
    };
    let client =
        BackendClient::with_settings(url, Some(credentials), Duration::from_secs(5)).unwrap();
    create_router(AppState::new(Arc::new(client)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_list_and_filter_students() {
    let backend = Backend::seeded();
    let app = gateway(backend.clone(), "secret").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/students", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"].as_array().unwrap().len(), 2);
    assert_eq!(body["students"][0]["name"], json!("Alice"));

    let (status, body) = call(&app, Method::GET, "/api/v1/students?class=9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"students": [{"id": "2", "name": "Bob", "class": "9", "status": true}]})
    );

    assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_student_detail_and_not_found() {
    let app = gateway(Backend::seeded(), "secret").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/students/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Alice"));

    let (status, body) = call(&app, Method::GET, "/api/v1/students/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "student 99 not found"}));
}

#[tokio::test]
async fn test_add_update_and_status_round_trip() {
    let backend = Backend::seeded();
    let app = gateway(backend.clone(), "secret").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/students",
        Some(json!({"name": "Carol", "class": "11"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "student added", "id": "3"}));

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/v1/students/3",
        Some(json!({"class": "12"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["student"]["class"], json!("12"));
    assert_eq!(body["student"]["name"], json!("Carol"));

    let (status, body) = call(
        &app,
        Method::PATCH,
        "/api/v1/students/3/status",
        Some(json!({"status": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "status updated", "status": false}));

    assert_eq!(backend.find("3").unwrap()["status"], json!(false));
}

#[tokio::test]
async fn test_backend_client_errors_pass_through() {
    let app = gateway(Backend::seeded(), "secret").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/students",
        Some(json!({"class": "11"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("name is required"));

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/v1/students/99",
        Some(json!({"class": "12"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_service_account_is_bad_gateway() {
    let backend = Backend::seeded();
    let app = gateway(backend.clone(), "wrong").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/students", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().starts_with("backend login failed"));
    assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_without_field_never_reaches_backend() {
    let backend = Backend::seeded();
    let app = gateway(backend.clone(), "secret").await;

    let (status, _) = call(
        &app,
        Method::PATCH,
        "/api/v1/students/1/status",
        Some(json!({"active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(backend.logins.load(Ordering::SeqCst), 0);
    assert_eq!(backend.find("1").unwrap()["status"], json!(true));
}
