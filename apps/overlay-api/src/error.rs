//! Error types for the overlay API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flatten_core::FlattenError;
use overlay_core::ValidationError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("PDF is larger than {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Session expired")]
    SessionExpired,

    #[error("Already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Pdf(#[from] FlattenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Validation(e @ ValidationError::RecipientMismatch { .. }) => {
                (StatusCode::FORBIDDEN, e.to_string())
            }
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::SessionExpired => (StatusCode::GONE, "Session has expired".to_string()),
            ApiError::AlreadyCompleted => (
                StatusCode::CONFLICT,
                "Session is already completed".to_string(),
            ),
            ApiError::Pdf(
                e @ (FlattenError::ParseError(_) | FlattenError::SignatureImage { .. }),
            ) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Pdf(e) => {
                tracing::error!("PDF error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PDF processing failed".to_string(),
                )
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.into())
    }
}
