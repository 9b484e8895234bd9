// ABOUTME: HTTP error envelope: maps core errors onto statuses and JSON bodies.
// ABOUTME: Every failure carries a message and a correlation id; 5xx hides detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::error::{generate_error_id, CoreError};
use serde_json::json;
use tracing::error;

/// A request-level failure, ready to render as a JSON error object.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    error_id: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error_id: generate_error_id(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            error_id: generate_error_id(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_id(&self) -> &str {
        &self.error_id
    }
}

impl From<CoreError> for ApiError {
    /// Map the error taxonomy onto HTTP statuses. Validation and lookup
    /// failures surface their own message; everything else is logged under
    /// a correlation id and replaced with a generic apology.
    fn from(err: CoreError) -> Self {
        let error_id = generate_error_id();
        let (status, message) = match &err {
            CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
            CoreError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "The response timed out. Please try a shorter or simpler query.".to_string(),
            ),
            CoreError::ExternalService { service, .. } => {
                error!(error = %err, error_id = %error_id, service, "external service failure");
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Sorry, something went wrong (Error ID: {error_id}). Our team has been notified."),
                )
            }
            CoreError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down.".to_string(),
            ),
            CoreError::Store(_) | CoreError::Internal(_) => {
                error!(error = %err, error_id = %error_id, "unexpected failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Sorry, something went wrong (Error ID: {error_id}). Our team has been notified."),
                )
            }
        };
        Self {
            status,
            message,
            error_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "id": self.error_id,
            }
        }));
        (self.status, body).into_response()
    }
}
