//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use formflow_core::automation::engine::{AUTOMATION_NOT_FOUND, EngineError};
use formflow_types::error::{RegistryError, RepositoryError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Webhook registry / automation store errors.
    Registry(RegistryError),
    /// A run could not start or ended abnormally.
    Engine(EngineError),
    /// Direct repository reads (executions, events).
    Repository(RepositoryError),
    /// A resource addressed by the path does not exist.
    NotFound(String),
    /// The resource exists but is in the wrong state for the request.
    Conflict(String),
    /// Malformed request.
    Validation(String),
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::Registry(e)
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
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Registry(RegistryError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }
            AppError::Registry(RegistryError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Registry(RegistryError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::Registry(e @ RegistryError::StorageError(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::Engine(e) => engine_parts(e),
            AppError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
            }
            AppError::Repository(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        }
    }
}

/// Status, code and message for an engine error. An aborted run answers
/// with the status of the error that stopped it.
pub(crate) fn engine_parts(error: &EngineError) -> (StatusCode, &'static str, String) {
    match error {
        EngineError::Configuration(msg) if msg == AUTOMATION_NOT_FOUND => {
            (StatusCode::NOT_FOUND, "AUTOMATION_NOT_FOUND", msg.clone())
        }
        EngineError::Configuration(msg) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "CONFIGURATION_ERROR", msg.clone())
        }
        EngineError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", error.to_string()),
        EngineError::Aborted { source, .. } => engine_parts(source),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "EXECUTION_ERROR", error.to_string()),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let body = ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string());
        (status, Json(body)).into_response()
    }
}
