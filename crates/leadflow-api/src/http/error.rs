//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use leadflow_core::engine::{EngineError, RetryError};
use leadflow_core::service::contact::ContactError;
use leadflow_core::service::flow::FlowServiceError;
use leadflow_types::error::RepositoryError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Flow definition errors.
    Flow(FlowServiceError),
    /// Contact submission errors.
    Contact(ContactError),
    /// Retry refusals.
    Retry(RetryError),
    /// Run setup or traversal failures.
    Engine(EngineError),
    /// Storage errors from direct queries.
    Repository(RepositoryError),
    /// Malformed request.
    Validation(String),
    /// Missing resource.
    NotFound(String),
}

impl From<FlowServiceError> for AppError {
    fn from(e: FlowServiceError) -> Self {
        AppError::Flow(e)
    }
}

impl From<ContactError> for AppError {
    fn from(e: ContactError) -> Self {
        AppError::Contact(e)
    }
}

impl From<RetryError> for AppError {
    fn from(e: RetryError) -> Self {
        AppError::Retry(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
        match self {
            AppError::Flow(FlowServiceError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "FLOW_NOT_FOUND",
                format!("Flow not found: {id}"),
                None,
            ),
            AppError::Flow(e @ (FlowServiceError::Invalid(_) | FlowServiceError::Parse(_))) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string(), None)
            }
            AppError::Flow(FlowServiceError::Repository(RepositoryError::Conflict(msg))) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None)
            }
            AppError::Flow(e) => (StatusCode::INTERNAL_SERVER_ERROR, "FLOW_ERROR", e.to_string(), None),

            AppError::Contact(ContactError::Invalid(errors)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Invalid contact submission".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            AppError::Contact(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONTACT_ERROR", e.to_string(), None)
            }

            AppError::Retry(e @ RetryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "EXECUTION_NOT_FOUND", e.to_string(), None)
            }
            AppError::Retry(e @ RetryError::NotFailed { .. }) => {
                (StatusCode::CONFLICT, "NOT_RETRYABLE", e.to_string(), None)
            }
            AppError::Retry(e @ RetryError::MissingContact(_)) => {
                (StatusCode::CONFLICT, "NOT_RETRYABLE", e.to_string(), None)
            }
            AppError::Retry(e @ RetryError::FlowNotFound(_)) => {
                (StatusCode::NOT_FOUND, "FLOW_NOT_FOUND", e.to_string(), None)
            }
            AppError::Retry(e) => (StatusCode::INTERNAL_SERVER_ERROR, "RETRY_ERROR", e.to_string(), None),

            AppError::Engine(e @ EngineError::FlowNotFound(_)) => {
                (StatusCode::NOT_FOUND, "FLOW_NOT_FOUND", e.to_string(), None)
            }
            AppError::Engine(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_ERROR", e.to_string(), None)
            }

            AppError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Entity not found".to_string(), None)
            }
            AppError::Repository(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string(), None)
            }

            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
