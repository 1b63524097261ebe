//! Unified error types for the students gateway.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Process-level error: startup, configuration and client construction.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a student service implementation.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No student with this id.
    #[error("student {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The gateway's own backend credentials were rejected.
    #[error("backend login failed: {0}")]
    Unauthorized(String),

    /// Backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Upstream {
        /// HTTP status from the backend.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// Backend body could not be decoded.
    #[error("failed to decode {0}")]
    Decode(String),

    /// Transport-level failure talking to the backend.
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Input the service refuses to forward.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Service temporarily unable to answer.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Status the gateway answers with when this error reaches a client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upstream { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Unauthorized(_)
            | ServiceError::Upstream { .. }
            | ServiceError::Decode(_)
            | ServiceError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Error returned by HTTP handlers; turned into a JSON error response.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Failure from the service layer.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// An extractor refused the request; keeps the extractor's status.
    #[error("{message}")]
    Rejected {
        /// Status chosen by the extractor (400, 413, 415, ...).
        status: StatusCode,
        /// Extractor message.
        message: String,
    },

    /// Request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Unexpected failure inside the middleware stack.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(e) => e.status_code(),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn rejected(status: StatusCode, message: String) -> Self {
        ApiError::Rejected { status, message }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        } else {
            warn!(status = %status, error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::rejected(rejection.status(), rejection.body_text())
    }
}

/// Map a failure from the timeout middleware onto the error envelope.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn upstream_client_errors_keep_their_status() {
        let err = ServiceError::Upstream {
            status: 422,
            body: "bad".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn upstream_server_errors_become_bad_gateway() {
        let err = ServiceError::Upstream {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ServiceError::Unauthorized("nope".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn service_not_found_maps_to_404() {
        let err = ApiError::from(ServiceError::NotFound {
            id: "9".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "student 9 not found");
    }

    #[tokio::test]
    async fn error_response_has_json_envelope() {
        let response = ApiError::Rejected {
            status: StatusCode::BAD_REQUEST,
            message: "missing field `status`".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "missing field `status`");
    }

    #[tokio::test]
    async fn timeout_elapsed_becomes_408() {
        let err = handle_middleware_error(Box::new(tower::timeout::error::Elapsed::new())).await;
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.to_string(), "request timed out");

        let err = handle_middleware_error("boom".into()).await;
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
