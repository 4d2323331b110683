/// Error handling for the API server
///
/// A unified error type that maps to HTTP responses. Handlers return
/// `ApiResult<T>`, and every `EngineError` converts to the appropriate
/// status code in one place.
///
/// Mapping highlights:
///
/// - `QuotaExceeded`, `TenantNotActive`, `UnknownTenant` surface to the
///   caller as rejected operations — they are never retried server-side
/// - `IsolationViolation` is a 500: it signals an internal-consistency
///   bug, the request aborts, and an alert-level log line fires
/// - `RegistryTimeout` is a 503: the request path fails closed

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_shared::error::EngineError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - duplicate tenant, version races
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests / quota exceeded (429)
    QuotaExceeded(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g. "tenant_not_active", "quota_exceeded")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::QuotaExceeded(msg) => write!(f, "Quota exceeded: {msg}"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {msg}"),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::QuotaExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded", msg, None)
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert engine errors to API errors
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DuplicateTenant { admin_email } => ApiError::Conflict(format!(
                "admin identity {admin_email} already owns a tenant"
            )),
            EngineError::NotFound(id) => ApiError::NotFound(format!("tenant {id} not found")),
            EngineError::UnknownTenant(id) => {
                ApiError::Unauthorized(format!("unknown tenant: {id}"))
            }
            EngineError::VersionConflict { .. } => {
                ApiError::Conflict("tenant record was modified concurrently; retry".to_string())
            }
            EngineError::InvalidTransition { from, to } => {
                ApiError::Conflict(format!("cannot transition tenant from {from} to {to}"))
            }
            EngineError::TenantNotActive { status, .. } => {
                ApiError::Forbidden(format!("tenant is not active (status: {status})"))
            }
            EngineError::MissingClaim(claim) => {
                ApiError::Unauthorized(format!("missing required claim: {claim}"))
            }
            EngineError::BindingNotReady { reason, .. } => {
                ApiError::Conflict(format!("resource binding not ready: {reason}"))
            }
            EngineError::IsolationViolation { .. } => {
                // Alert-level: serving this would expose cross-tenant data.
                tracing::error!(error = %err, "isolation violation surfaced to API layer");
                ApiError::InternalError(err.to_string())
            }
            EngineError::QuotaExceeded {
                kind,
                current,
                limit,
                ..
            } => ApiError::QuotaExceeded(format!("{kind} limit reached ({current}/{limit})")),
            EngineError::RegistryTimeout(timeout) => ApiError::ServiceUnavailable(format!(
                "registry lookup timed out after {timeout:?}"
            )),
            EngineError::Store(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Convert validation errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }
}
