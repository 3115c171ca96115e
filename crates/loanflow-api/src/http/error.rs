//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use loanflow_core::workflow::WorkflowError;
use loanflow_types::error::RepositoryError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine errors (unknown run, duplicate start, failed run, ...).
    Workflow(WorkflowError),
    /// Direct repository access failed.
    Repository(RepositoryError),
    /// A looked-up resource does not exist.
    NotFound(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Workflow(WorkflowError::RunNotFound(_)) => {
                (StatusCode::NOT_FOUND, "RUN_NOT_FOUND")
            }
            AppError::Workflow(WorkflowError::UnknownWorkflow(_)) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND")
            }
            AppError::Workflow(WorkflowError::DuplicateRun(_)) => {
                (StatusCode::CONFLICT, "DUPLICATE_RUN")
            }
            AppError::Workflow(WorkflowError::Serialization(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Workflow(WorkflowError::ResultTimeout(_)) => {
                (StatusCode::REQUEST_TIMEOUT, "RESULT_TIMEOUT")
            }
            AppError::Workflow(WorkflowError::Failed(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RUN_FAILED")
            }
            AppError::Workflow(WorkflowError::Interrupted | WorkflowError::Aborted(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "RUN_INTERRUPTED")
            }
            AppError::Workflow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "WORKFLOW_ERROR"),
            AppError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AppError::Repository(RepositoryError::Conflict(_)) => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            AppError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Workflow(e) => e.to_string(),
            AppError::Repository(e) => e.to_string(),
            AppError::NotFound(msg) | AppError::Validation(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string(), 0);
        (status, Json(body)).into_response()
    }
}
