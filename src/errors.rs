use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::{signing::SignatureError, storage_service::StorageError};

/// A lightweight wrapper for HTTP errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 403 Forbidden
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            StorageError::BucketAlreadyExists(_) | StorageError::BucketNotEmpty(_) => {
                StatusCode::CONFLICT
            }
            StorageError::InvalidBucketName { .. }
            | StorageError::InvalidObjectKey
            | StorageError::UnsupportedLocation(_)
            | StorageError::SameSourceAndDestination(_) => StatusCode::BAD_REQUEST,
            StorageError::Sqlx(_) | StorageError::Io(_) => {
                tracing::error!("storage failure: {}", err);
                return AppError::internal("internal storage error");
            }
        };
        AppError::new(status, err.to_string())
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::forbidden(err.to_string())
    }
}
