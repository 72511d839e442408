use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::logging::SecurityEvent;
use crate::models::ValidationError;

/// Centralized application error type that encompasses all error variants
/// across different modules and provides consistent error responses.
#[derive(Debug, Error)]
pub enum AppError {
    // Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Request parsing errors
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("unsupported media type: expected application/json or application/x-www-form-urlencoded")]
    UnsupportedMediaType,

    #[error("request body too large")]
    PayloadTooLarge,

    // Admin access
    #[error("authorization header is missing")]
    MissingAuthHeader,

    #[error("authorization header is malformed")]
    InvalidAuthHeader,

    #[error("invalid admin token")]
    InvalidAdminToken,

    #[error("admin access is not configured")]
    AdminDisabled,

    // Rate limiting
    #[error("rate limit exceeded; please try again later")]
    RateLimitExceeded { retry_after: Option<Duration> },

    // Database errors
    #[error("{0}")]
    Database(#[source] DbError),
}

/// Standard JSON error response structure
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl AppError {
    /// Determines the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client errors
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MissingAuthHeader => StatusCode::UNAUTHORIZED,
            AppError::InvalidAuthHeader => StatusCode::UNAUTHORIZED,
            AppError::InvalidAdminToken => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 5xx Server errors
            AppError::AdminDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(DbError::NotConfigured { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Gets the user-facing error message. Database failures never expose
    /// their underlying text.
    fn user_message(&self) -> String {
        match self {
            AppError::Database(DbError::NotConfigured { .. }) => {
                "service temporarily unavailable".to_string()
            }
            AppError::Database(_) => "an unexpected error occurred".to_string(),
            _ => self.to_string(),
        }
    }

    /// Logs the error with appropriate context
    /// This allows internal errors to be logged even when not exposed to clients
    fn log_error(&self) {
        match self.status_code() {
            code if code.is_client_error() => match self {
                AppError::MissingAuthHeader
                | AppError::InvalidAuthHeader
                | AppError::InvalidAdminToken => {
                    crate::log_security_event!(
                        SecurityEvent::AdminAccessDenied,
                        error = %self,
                        status_code = %code,
                        "Unauthorized admin access attempt"
                    );
                }
                _ => {
                    tracing::warn!(
                        error = %self,
                        status_code = %code,
                        "Client error"
                    );
                }
            },
            code if code.is_server_error() => {
                tracing::error!(
                    error = %self,
                    status_code = %code,
                    source = ?self.source(),
                    "Server error"
                );
            }
            _ => {}
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before converting to response
        self.log_error();

        let status = self.status_code();
        let body = Json(ErrorResponse {
            success: false,
            error: self.user_message(),
        });

        let mut response = (status, body).into_response();
        if let AppError::RateLimitExceeded {
            retry_after: Some(retry_after),
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<DbError> for AppError {
    fn from(error: DbError) -> Self {
        AppError::Database(error)
    }
}
