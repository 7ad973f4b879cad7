//! Rich error handling for the DevOS server.
//!
//! This module provides the structured error type shared by every HTTP
//! handler and middleware. Errors carry a stable machine-readable code, an
//! HTTP status, and a details map, and render as the JSON envelope
//! `{"error": {"code", "message", "status_code", "details"}}`.
//!
//! # Error Codes
//!
//! | Code | Status | Usage |
//! |------|--------|-------|
//! | `TIMEOUT_ERROR` | 408 | Deadline exceeded (route ceiling or upstream call) |
//! | `CIRCUIT_BREAKER_OPEN` | 503 | Call rejected by breaker admission |
//! | `SERVICE_UNAVAILABLE` | 503 | Upstream dependency failed after being attempted |
//! | `VALIDATION_ERROR` | 400 | Malformed caller input |
//! | `INTERNAL_ERROR` | 500 | Unexpected server error |

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::resilience::{CircuitBreakerOpenError, TimeoutError};

/// Error codes for the DevOS server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Deadline exceeded.
    TimeoutError,
    /// Call rejected by an open circuit breaker.
    CircuitBreakerOpen,
    /// Downstream dependency failed after being attempted.
    ServiceUnavailable,
    /// Malformed caller input.
    ValidationError,
    /// Unexpected server error.
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::TimeoutError => StatusCode::REQUEST_TIMEOUT,
            Self::CircuitBreakerOpen | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable code string used on the wire.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A rich error with context, rendered as the standard JSON envelope.
#[derive(Debug, Error)]
pub struct ApiError {
    /// Error code.
    code: ErrorCode,
    /// Human-readable message.
    message: String,
    /// Additional details (key-value pairs).
    details: serde_json::Map<String, Value>,
}

impl ApiError {
    /// Create a new error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    /// Add a detail entry to the error.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the details map.
    #[must_use]
    pub const fn details(&self) -> &serde_json::Map<String, Value> {
        &self.details
    }

    /// Render the JSON body for this error.
    #[must_use]
    pub fn to_body(&self) -> Value {
        serde_json::json!({
            "error": {
                "code": self.code.reason(),
                "message": self.message,
                "status_code": self.code.status_code().as_u16(),
                "details": self.details,
            }
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.code.status_code(), Json(self.to_body())).into_response()
    }
}

/// Convenience constructors for common errors.
impl ApiError {
    /// Malformed caller input.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Unexpected server error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Downstream dependency failed after being attempted.
    #[must_use]
    pub fn unavailable(service: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message).with_detail("service", service)
    }
}

impl From<TimeoutError> for ApiError {
    fn from(err: TimeoutError) -> Self {
        Self::new(ErrorCode::TimeoutError, err.to_string())
            .with_detail("operation", err.operation.clone())
            .with_detail("timeout_seconds", err.timeout_seconds)
            .with_detail("elapsed_seconds", err.elapsed_seconds)
    }
}

impl From<CircuitBreakerOpenError> for ApiError {
    fn from(err: CircuitBreakerOpenError) -> Self {
        Self::new(ErrorCode::CircuitBreakerOpen, err.to_string())
            .with_detail("service", err.service.clone())
            .with_detail("retry_after_seconds", err.retry_after_seconds)
    }
}
