/// Engine error taxonomy
///
/// Every fallible operation in the isolation engine returns `EngineError`.
/// The variants fall into three groups:
///
/// - **Registry consistency**: `DuplicateTenant`, `NotFound`,
///   `VersionConflict`, `InvalidTransition`
/// - **Request-context resolution**: `UnknownTenant`, `TenantNotActive`,
///   `MissingClaim`, `RegistryTimeout`
/// - **Routing and quota**: `BindingNotReady`, `IsolationViolation`,
///   `QuotaExceeded`
///
/// `VersionConflict` is recovered locally via re-read and retry (see
/// `registry::update_with_retry`); `QuotaExceeded`, `TenantNotActive`,
/// `UnknownTenant`, and `IsolationViolation` always surface to the caller.
/// `IsolationViolation` indicates an internal-consistency bug and must abort
/// the request rather than fall back to anything.

use crate::models::tenant::{ResourceKind, TenantStatus};
use std::time::Duration;
use uuid::Uuid;

/// Engine result type alias
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The admin identity already owns a live (non-deleted) tenant
    #[error("admin identity {admin_email} already owns a live tenant")]
    DuplicateTenant { admin_email: String },

    /// No tenant record with this id
    #[error("tenant not found: {0}")]
    NotFound(Uuid),

    /// Optimistic-concurrency update lost the race; re-read and retry
    #[error("version conflict on tenant {tenant_id}: expected {expected}, found {actual}")]
    VersionConflict {
        tenant_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// Status change not permitted by the lifecycle state machine
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: TenantStatus,
        to: TenantStatus,
    },

    /// Claims name a tenant id with no registry record
    #[error("unknown tenant: {0}")]
    UnknownTenant(Uuid),

    /// Tenant exists but is not in `active` status
    #[error("tenant {tenant_id} is not active (status: {status})")]
    TenantNotActive {
        tenant_id: Uuid,
        status: TenantStatus,
    },

    /// A required identity claim is absent
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),

    /// Resource binding is incomplete for the tenant's isolation model
    #[error("resource binding for tenant {tenant_id} is not ready: {reason}")]
    BindingNotReady { tenant_id: Uuid, reason: String },

    /// Router produced a binding for a different tenant than requested.
    /// Serving this would mean cross-tenant data exposure; abort the request.
    #[error("isolation violation: binding bound to {bound} resolved for context {requested}")]
    IsolationViolation { requested: Uuid, bound: Uuid },

    /// Atomic check-and-increment found the tier ceiling reached
    #[error("{kind} quota exceeded for tenant {tenant_id} ({current}/{limit})")]
    QuotaExceeded {
        tenant_id: Uuid,
        kind: ResourceKind,
        current: i64,
        limit: i64,
    },

    /// Registry lookup exceeded the request-path timeout; callers fail
    /// closed (deny access), never open
    #[error("registry lookup timed out after {0:?}")]
    RegistryTimeout(Duration),

    /// Underlying store failure (connection, serialization, corrupt row)
    #[error("store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::Store("row not found".to_string()),
            other => EngineError::Store(other.to_string()),
        }
    }
}

impl EngineError {
    /// True for errors that a caller may recover from by re-reading state
    /// and retrying the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::VersionConflict { .. })
    }
}
