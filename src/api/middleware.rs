use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Request cannot be turned into a valid statement (bad model id,
    /// unparsable or non-SELECT SQL)
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A sub-statement was invalid before the union could be built
    #[error("Union error: {0}")]
    Union(String),

    /// Backend executor failure
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::Conversion(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("CONVERSION_ERROR", msg),
            ),
            AppError::Union(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("UNION_ERROR", msg),
            ),
            AppError::Execution(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("EXECUTION_ERROR", msg),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorDetail::new("NOT_FOUND", msg)),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status_codes() {
        let error = AppError::Conversion("no schema found for model 7".to_string());
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let error = AppError::Union("sub-statement 1 failed to parse".to_string());
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let error = AppError::Execution("backend timed out".to_string());
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let error = AppError::NotFound("model 9".to_string());
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_detail_creation() {
        let detail = ErrorDetail::new("TEST_CODE", "Test message");
        assert_eq!(detail.code, "TEST_CODE");
        assert_eq!(detail.message, "Test message");
    }
}
