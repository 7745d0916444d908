//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lovenote_core::StoreError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    /// Logged server-side; the client only sees a generic message
    Internal(String),
    /// Logged server-side; the client only sees a generic message
    Database(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::new("INTERNAL_ERROR", "Internal server error")
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                ApiError::new("DATABASE_ERROR", "Database operation failed")
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Duplicate(msg) => AppError::Conflict(msg),
            StoreError::RelationshipLimit { limit } => AppError::Conflict(format!(
                "A user can belong to at most {limit} relationships"
            )),
            StoreError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(format!("Validation failed: {errors}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}
