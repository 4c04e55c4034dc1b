//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps workflow errors to HTTP status codes by their [`ErrorKind`] and
//! carries the workflow's stable error code in the body. Internal error
//! details are never exposed in responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use arbiter_state::{ErrorKind, WorkflowError};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "STALE_STATE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional context, omitted for internal errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A dependency is down (503). Safe to retry.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// A workflow operation failed. Status follows the error's kind.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Workflow(err) => {
                let status = match err.kind() {
                    ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Authorization => StatusCode::FORBIDDEN,
                    ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }

    fn is_internal(&self) -> bool {
        match self {
            Self::Internal(_) => true,
            Self::Workflow(err) => err.kind() == ErrorKind::Internal,
            _ => false,
        }
    }

    /// Extra context for clients that want to react programmatically.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ServiceUnavailable(_) => Some(json!({ "retryable": true })),
            Self::Workflow(err) if err.is_retryable() => Some(json!({ "retryable": true })),
            Self::Workflow(WorkflowError::DuplicateResolution {
                current: Some(current),
                ..
            }) => Some(json!({ "current_resolution_id": current })),
            Self::Workflow(
                WorkflowError::WindowOpen { window_ends, .. }
                | WorkflowError::WindowClosed { window_ends, .. },
            ) => Some(json!({ "dispute_window_ends": window_ends })),
            Self::Workflow(WorkflowError::OpenDisputesExist { open, .. }) => {
                Some(json!({ "open_disputes": open }))
            }
            Self::Workflow(WorkflowError::StaleState {
                expected, actual, ..
            }) => Some(json!({ "expected": expected, "actual": actual })),
            Self::Workflow(WorkflowError::DisputeNotOpen { status, .. }) => {
                Some(json!({ "status": status }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let (message, details) = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            ("An internal error occurred".to_string(), None)
        } else {
            (self.to_string(), self.details())
        };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %self, "dependency unavailable");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Malformed identifiers in paths and bodies.
impl From<arbiter_core::ValidationError> for AppError {
    fn from(err: arbiter_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
