//! Error types for the scan-to-pay server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Application error type.
///
/// Every variant except `Database` and `Internal` is a client-visible,
/// non-retryable outcome. `Database` is the transient class: the failed
/// operation was rolled back and may be retried as-is.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invoice {public_id} is not payable (status={status})")]
    AlreadyPaid { public_id: String, status: String },

    #[error("Invoice {0} has expired")]
    Expired(String),

    #[error("Insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: String, required: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::AlreadyPaid { .. } => StatusCode::CONFLICT,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Service temporarily unavailable, please retry".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
