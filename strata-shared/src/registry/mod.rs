/// Tenant registry — the single source of truth for tenant state
///
/// The registry exclusively owns tenant records. Reads return immutable
/// snapshots; the only mutation path is `update`, which uses optimistic
/// versioning: the caller presents the version it read, and the update
/// fails with `VersionConflict` if that version is stale. Status changes
/// are additionally validated against the lifecycle state machine.
///
/// Two implementations:
///
/// - `MemoryStore`: `DashMap`-backed, used by tests and single-process
///   wiring
/// - `PgStore`: durable Postgres store
///
/// # Example
///
/// ```no_run
/// use strata_shared::registry::{MemoryStore, TenantStore};
/// use strata_shared::models::tenant::{TenantDraft, TenantStatus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
///
/// let tenant = store.create(TenantDraft {
///     company_name: "Acme Corp".to_string(),
///     admin_email: "admin@acme.test".to_string(),
///     tier: Default::default(),
///     isolation_model: Default::default(),
/// }).await?;
///
/// let updated = store
///     .update(tenant.tenant_id, tenant.version, &|t| {
///         t.status = TenantStatus::Provisioning;
///     })
///     .await?;
/// assert_eq!(updated.version, tenant.version + 1);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use crate::error::{EngineError, EngineResult};
use crate::models::tenant::{Tenant, TenantDraft, TenantStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Mutation closure applied to a snapshot inside `TenantStore::update`.
pub type Mutator<'a> = &'a (dyn Fn(&mut Tenant) + Send + Sync);

/// Durable store of tenant records and their resource bindings.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Creates a record in `requested` status with a fresh tenant id.
    ///
    /// # Errors
    ///
    /// `DuplicateTenant` if the admin identity already owns a live
    /// (non-deleted) tenant.
    async fn create(&self, draft: TenantDraft) -> EngineResult<Tenant>;

    /// Point lookup. `NotFound` if no record exists.
    async fn get(&self, tenant_id: Uuid) -> EngineResult<Tenant>;

    /// Optimistic-concurrency update.
    ///
    /// Applies `mutator` to a copy of the current record and commits it
    /// only if `expected_version` still matches; otherwise fails with
    /// `VersionConflict`, forcing the caller to re-read and retry. Status
    /// changes are validated against the lifecycle state machine. This is
    /// the only path that mutates `status`, `resource_binding`, `limits`,
    /// or anything else on a tenant.
    async fn update(
        &self,
        tenant_id: Uuid,
        expected_version: u64,
        mutator: Mutator<'_>,
    ) -> EngineResult<Tenant>;

    /// Soft delete: marks `status = deleted` and stamps `deleted_at`.
    /// The record is preserved for audit history.
    async fn mark_deleted(&self, tenant_id: Uuid) -> EngineResult<Tenant>;

    /// Live (non-deleted) tenant owned by this admin identity, if any.
    async fn find_by_admin_email(&self, email: &str) -> EngineResult<Option<Tenant>>;

    /// Tenants in a given status, oldest first. The provisioner's poll
    /// query.
    async fn list_by_status(
        &self,
        status: TenantStatus,
        limit: usize,
    ) -> EngineResult<Vec<Tenant>>;
}

/// Applies a mutator to a snapshot, enforcing version and transition
/// rules. Shared by both store implementations; the result is what the
/// implementation commits.
pub(crate) fn apply_update(
    current: &Tenant,
    expected_version: u64,
    mutator: Mutator<'_>,
) -> EngineResult<Tenant> {
    if current.version != expected_version {
        return Err(EngineError::VersionConflict {
            tenant_id: current.tenant_id,
            expected: expected_version,
            actual: current.version,
        });
    }

    let mut next = current.clone();
    mutator(&mut next);

    // Immutable fields stay immutable no matter what the mutator did.
    next.tenant_id = current.tenant_id;
    next.created_at = current.created_at;

    if next.status != current.status {
        current.status.validate_transition(next.status)?;
    }

    next.version = current.version + 1;
    // updated_at is monotonic non-decreasing.
    next.updated_at = Utc::now().max(current.updated_at);

    Ok(next)
}

/// Read-modify-write helper: retries `VersionConflict` with a fresh read,
/// up to `max_attempts`. Other errors surface immediately.
pub async fn update_with_retry(
    store: &Arc<dyn TenantStore>,
    tenant_id: Uuid,
    max_attempts: u32,
    mutator: Mutator<'_>,
) -> EngineResult<Tenant> {
    let mut last = None;
    for _ in 0..max_attempts {
        let current = store.get(tenant_id).await?;
        match store.update(tenant_id, current.version, mutator).await {
            Ok(tenant) => return Ok(tenant),
            Err(err) if err.is_retryable() => last = Some(err),
            Err(err) => return Err(err),
        }
    }
    Err(last.unwrap_or(EngineError::Store(
        "update_with_retry called with zero attempts".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::{IsolationModel, TenantTier};

    fn draft() -> TenantDraft {
        TenantDraft {
            company_name: "Acme Corp".to_string(),
            admin_email: "admin@acme.test".to_string(),
            tier: TenantTier::Basic,
            isolation_model: IsolationModel::Pool,
        }
    }

    #[test]
    fn test_apply_update_bumps_version() {
        let tenant = Tenant::from_draft(draft());
        let next = apply_update(&tenant, tenant.version, &|t| {
            t.company_name = "Acme Holdings".to_string();
        })
        .unwrap();
        assert_eq!(next.version, tenant.version + 1);
        assert_eq!(next.company_name, "Acme Holdings");
    }

    #[test]
    fn test_apply_update_stale_version() {
        let tenant = Tenant::from_draft(draft());
        let err = apply_update(&tenant, tenant.version + 5, &|_| {}).unwrap_err();
        assert!(matches!(err, EngineError::VersionConflict { .. }));
    }

    #[test]
    fn test_apply_update_rejects_invalid_transition() {
        let tenant = Tenant::from_draft(draft());
        let err = apply_update(&tenant, tenant.version, &|t| {
            t.status = TenantStatus::Active; // requested -> active is not a thing
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_apply_update_pins_immutable_fields() {
        let tenant = Tenant::from_draft(draft());
        let next = apply_update(&tenant, tenant.version, &|t| {
            t.tenant_id = Uuid::nil();
        })
        .unwrap();
        assert_eq!(next.tenant_id, tenant.tenant_id);
    }

    #[test]
    fn test_apply_update_monotonic_updated_at() {
        let mut tenant = Tenant::from_draft(draft());
        tenant.updated_at = Utc::now() + chrono::Duration::hours(1);
        let next = apply_update(&tenant, tenant.version, &|_| {}).unwrap();
        assert!(next.updated_at >= tenant.updated_at);
    }
}
