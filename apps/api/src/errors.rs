use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::docx::ContainerError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Upload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ContainerError> for AppError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::NotAnArchive(_) => {
                AppError::Validation("Uploaded file is not a .docx document".to_string())
            }
            other => AppError::InvalidContainer(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidContainer(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_CONTAINER",
                msg.clone(),
            ),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg.clone()),
            AppError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                self.to_string(),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_SERVICE_ERROR",
                    "The assistant is currently unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
