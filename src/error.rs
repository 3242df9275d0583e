//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::cache::CacheError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: bad caller input, reported verbatim with the offending values
/// - **Unauthorized**: missing, invalid, expired or deactivated credential, or missing permission
/// - **NotFound**: no key matches a presented secret or a requested id
/// - **Internal**: store, cache or hashing failures; detail is logged, never returned
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache round trip failed where the caller cannot degrade around it.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Request input is invalid.
    ///
    /// `invalid` lists every offending value (e.g. unknown permission names).
    #[error("{message}")]
    Validation {
        message: String,
        invalid: Vec<String>,
    },

    /// Credential missing or not acceptable, or permission denied.
    ///
    /// The reason is a fixed public string; nothing about the stored key leaks through it.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Requested key does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Unexpected failure outside the database and cache (e.g. hashing).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure with no specific offending values.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            invalid: Vec::new(),
        }
    }

    pub fn key_not_found() -> Self {
        AppError::NotFound("Key not found".to_string())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "validation_error",
///     "message": "Invalid permissions: NOT_A_PERMISSION",
///     "details": ["NOT_A_PERMISSION"]
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Validation` → 400 Bad Request
/// - `Unauthorized` → 401 Unauthorized
/// - `NotFound` → 404 Not Found
/// - `Database`, `Cache`, `Internal` → 500 Internal Server Error (details logged, hidden from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::Validation {
                ref message,
                ref invalid,
            } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message.clone(),
                (!invalid.is_empty()).then(|| invalid.clone()),
            ),
            AppError::Unauthorized(reason) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                reason.to_string(),
                None,
            ),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = json!(details);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
