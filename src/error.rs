use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// Payload rejected by a validation schema.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing or invalid session.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness or state conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment processor failure.
    #[error("Payment error: {0}")]
    Payment(String),

    /// Rejected identity-provider webhook (signature, payload).
    #[error("Identity webhook rejected: {0}")]
    Identity(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure category reported to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resource does not exist.
    NotFound,
    /// Payload failed validation.
    Validation,
    /// No valid session.
    Unauthorized,
    /// Session lacks permission.
    Forbidden,
    /// Duplicate or invalid state transition.
    Conflict,
    /// A third-party service failed.
    Upstream,
    /// Anything unexpected.
    Internal,
}

impl AppError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Validation(_) | AppError::Identity(_) => ErrorKind::Validation,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Payment(_) => ErrorKind::Upstream,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to API clients.
    ///
    /// Internal failures are reported generically; the detail goes to the log.
    fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error payload of a failed action.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
}

/// `{"success": false, "error": {...}}`
#[derive(Debug, Serialize)]
pub struct ApiFailure {
    success: bool,
    /// Error details.
    pub error: ErrorBody,
}

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T> {
    success: bool,
    /// Action payload.
    pub data: T,
}

impl<T: Serialize> ApiSuccess<T> {
    /// Wrap a payload.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl From<&AppError> for ApiFailure {
    fn from(err: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                kind: err.kind(),
                message: err.public_message(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        (status, Json(ApiFailure::from(&self))).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

/// Shorthand for handler return values.
pub type ApiResult<T> = Result<ApiSuccess<T>>;

/// Wrap a payload as a successful API response.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiSuccess::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Payment("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Identity("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_failure_envelope_shape() {
        let err = AppError::Validation("title: length".into());
        let json = serde_json::to_value(ApiFailure::from(&err)).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "validation");
        assert_eq!(json["error"]["message"], "Validation failed: title: length");
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = AppError::Internal("connection string secret".into());
        let json = serde_json::to_value(ApiFailure::from(&err)).unwrap();

        assert_eq!(json["error"]["kind"], "internal");
        assert_eq!(json["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_success_envelope_shape() {
        let json = serde_json::to_value(ApiSuccess::new(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][1], 2);
    }
}
