//! Error Types for the Loom Gateway
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as `{"error": {"message": ..., "type": ...}}`
//! with the appropriate HTTP status code. Upstream non-2xx responses are
//! never represented as errors - they pass through the proxy verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for gateway responses.
///
/// Each error code maps to a specific HTTP status code and a wire-level
/// `type` string in the error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed body or missing required field (400)
    InvalidRequest,

    /// Missing or invalid credential, expired token (401)
    Unauthorized,

    /// Authenticated but not permitted (403)
    Forbidden,

    /// Referenced entity absent for this principal (404)
    NotFound,

    /// Duplicate email, last-owner demotion, already-a-member (409)
    Conflict,

    /// The owning tenant is suspended (403)
    TenantSuspended,

    /// Effective provider config is missing required credentials (400)
    ProviderMisconfigured,

    /// Network failure reaching the upstream provider (502)
    UpstreamUnavailable,

    /// Unexpected failure (500)
    Internal,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::TenantSuspended => StatusCode::FORBIDDEN,
            ErrorCode::ProviderMisconfigured => StatusCode::BAD_REQUEST,
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `type` string carried in the error body.
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::Unauthorized => "invalid_request_error",
            ErrorCode::Forbidden => "permission_error",
            ErrorCode::NotFound => "not_found_error",
            ErrorCode::Conflict => "conflict_error",
            ErrorCode::TenantSuspended => "tenant_suspended",
            ErrorCode::ProviderMisconfigured => "provider_misconfigured",
            ErrorCode::UpstreamUnavailable => "upstream_error",
            ErrorCode::Internal => "server_error",
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::NotFound => "Entity not found",
            ErrorCode::Conflict => "Operation conflicts with current state",
            ErrorCode::TenantSuspended => "Tenant is suspended",
            ErrorCode::ProviderMisconfigured => "Provider is misconfigured",
            ErrorCode::UpstreamUnavailable => "Upstream provider unavailable",
            ErrorCode::Internal => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error for gateway operations.
///
/// Returned by every endpoint when an operation fails; serialised on the
/// wire as `{"error": {"message": ..., "type": ...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidRequest error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create an Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a NotFound error.
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} {} not found", entity, id))
    }

    /// Create a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Create a TenantSuspended error.
    pub fn tenant_suspended() -> Self {
        Self::from_code(ErrorCode::TenantSuspended)
    }

    /// Create a ProviderMisconfigured error.
    pub fn provider_misconfigured(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderMisconfigured, message)
    }

    /// Create an UpstreamUnavailable error.
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// The wire body for this error.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.message,
                "type": self.code.error_type(),
            }
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling
/// in Axum handlers:
/// ```ignore
/// async fn handler() -> Result<Json<Response>, ApiError> {
///     Err(ApiError::unauthorized("Invalid API key"))
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.body())).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = ?err, "database error");
        // Generic message to avoid leaking internals
        ApiError::internal("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!(error = ?err, "connection pool error");
        ApiError::internal("Failed to acquire database connection")
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_request(format!("Invalid JSON: {}", err))
    }
}

impl From<loom_core::CryptoError> for ApiError {
    fn from(err: loom_core::CryptoError) -> Self {
        tracing::error!(error = %err, "crypto error");
        ApiError::internal("Cryptographic operation failed")
    }
}

impl From<loom_core::ConfigResolveError> for ApiError {
    fn from(err: loom_core::ConfigResolveError) -> Self {
        use loom_core::ConfigResolveError::*;
        match &err {
            TenantNotFound { tenant_id } => ApiError::not_found("Tenant", tenant_id),
            TenantSuspended { .. } => ApiError::tenant_suspended(),
            ProviderMisconfigured { reason } => ApiError::provider_misconfigured(reason.clone()),
            ParentCycle { .. } => ApiError::conflict(err.to_string()),
        }
    }
}

impl From<loom_llm::UpstreamError> for ApiError {
    fn from(err: loom_llm::UpstreamError) -> Self {
        ApiError::upstream_unavailable(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for gateway operations.
pub type ApiResult<T> = Result<T, ApiError>;
