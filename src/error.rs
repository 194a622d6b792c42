// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::decision::Action;
use crate::storage::{StorageError, ValidationError};

/// Failure surface of the dispatcher.
///
/// Authorization denials, validation failures and malformed input are all
/// client-correctable and share the 409 status; the `code` field keeps them
/// apart. Storage failures are the only server-side class.
#[derive(Debug)]
pub enum ApiError {
    // 409 Conflict
    NotAuthorized { action: Action, model: String },
    ValidationError(String),
    MalformedInput(String),

    // 500 Internal Server Error
    StorageError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotAuthorized { .. } => 409,
            ApiError::ValidationError(_) => 409,
            ApiError::MalformedInput(_) => 409,
            ApiError::StorageError(_) => 500,
        }
    }

    /// Get client-facing error message
    pub fn message(&self) -> String {
        match self {
            ApiError::NotAuthorized { action, model } => match action {
                Action::Read => format!("You are not authorized to read {}s", model),
                Action::Search => format!("You are not authorized to search {}s", model),
                Action::Create => format!("You are not authorized to create this {}", model),
                Action::Update => format!("You are not authorized to update this {}", model),
                Action::Del => format!("You are not authorized to delete this {}", model),
            },
            ApiError::ValidationError(msg) => format!("Error validating your input {}", msg),
            ApiError::MalformedInput(msg) => format!("Malformed request: {}", msg),
            ApiError::StorageError(msg) => format!("Database connection error: {}", msg),
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotAuthorized { .. } => "NOT_AUTHORIZED",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::MalformedInput(_) => "MALFORMED_INPUT",
            ApiError::StorageError(_) => "STORAGE_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

impl ApiError {
    pub fn not_authorized(action: Action, model: impl Into<String>) -> Self {
        ApiError::NotAuthorized { action, model: model.into() }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        ApiError::MalformedInput(message.into())
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        ApiError::StorageError(message.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!("Storage error: {}", err);
        ApiError::storage_error(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_error(err.message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_share_conflict_status() {
        let denied = ApiError::not_authorized(Action::Read, "Note");
        let invalid = ApiError::validation_error("\"title\" is required");
        let malformed = ApiError::malformed_input("page must be a positive integer");
        for err in [&denied, &invalid, &malformed] {
            assert_eq!(err.status_code(), 409);
        }
        assert_ne!(denied.error_code(), invalid.error_code());
        assert_eq!(denied.message(), "You are not authorized to read Notes");
    }

    #[test]
    fn test_storage_error_interpolates_cause() {
        let err: ApiError = StorageError::Connection("pool timed out".into()).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_json()["message"], "Database connection error: pool timed out");
    }
}
