/// Tier-based quota enforcement
///
/// The quota enforcer exclusively owns per-tenant usage counters; no other
/// component reads or writes them. `authorize` is an atomic
/// check-and-increment: the counter moves only if `current + delta` stays
/// within the tier ceiling, via a compare-and-swap loop, so two concurrent
/// creation requests can never both pass a stale check and jointly exceed
/// the limit.
///
/// Limits come from the tenant record per call — a tier upgrade or
/// downgrade affects future checks only and never retroactively
/// invalidates existing entities. A limit of `-1` means unlimited.
///
/// # Example
///
/// ```no_run
/// use strata_shared::quota::QuotaEnforcer;
/// use strata_shared::models::tenant::ResourceKind;
/// use strata_shared::registry::MemoryStore;
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # async fn example(tenant_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let enforcer = QuotaEnforcer::new(Arc::new(MemoryStore::new()));
///
/// // Before creating a product:
/// let decision = enforcer.authorize(tenant_id, ResourceKind::Products, 1).await?;
/// println!("usage now {}/{}", decision.current, decision.limit);
///
/// // On deleting one:
/// enforcer.release(tenant_id, ResourceKind::Products, 1);
/// # Ok(())
/// # }
/// ```

use crate::error::{EngineError, EngineResult};
use crate::models::tenant::{ResourceKind, UNLIMITED};
use crate::registry::TenantStore;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a successful authorization.
#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    /// Usage after the increment
    pub current: i64,

    /// Ceiling at decision time (`-1` = unlimited)
    pub limit: i64,

    /// Headroom remaining (`-1` = unlimited)
    pub remaining: i64,
}

pub struct QuotaEnforcer {
    store: Arc<dyn TenantStore>,
    counters: DashMap<(Uuid, ResourceKind), Arc<AtomicI64>>,
    registry_timeout: Duration,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        QuotaEnforcer {
            store,
            counters: DashMap::new(),
            registry_timeout: crate::context::DEFAULT_REGISTRY_TIMEOUT,
        }
    }

    pub fn with_timeout(store: Arc<dyn TenantStore>, registry_timeout: Duration) -> Self {
        QuotaEnforcer {
            store,
            counters: DashMap::new(),
            registry_timeout,
        }
    }

    /// Atomically reserves `delta` units of a resource kind, failing with
    /// `QuotaExceeded` if the tier ceiling would be crossed.
    ///
    /// # Errors
    ///
    /// - `QuotaExceeded` — never silently retried; retrying would not
    ///   change the outcome
    /// - `NotFound` / `RegistryTimeout` from the limit lookup (fail
    ///   closed)
    pub async fn authorize(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        delta: i64,
    ) -> EngineResult<QuotaDecision> {
        if delta < 0 {
            return Err(EngineError::Store(format!(
                "authorize called with negative delta {delta}"
            )));
        }

        let limit = self.limit_for(tenant_id, kind).await?;
        let counter = self.counter(tenant_id, kind);

        if limit == UNLIMITED {
            let current = counter.fetch_add(delta, Ordering::AcqRel) + delta;
            return Ok(QuotaDecision {
                current,
                limit,
                remaining: UNLIMITED,
            });
        }

        loop {
            let current = counter.load(Ordering::Acquire);
            let next = current + delta;
            if next > limit {
                return Err(EngineError::QuotaExceeded {
                    tenant_id,
                    kind,
                    current,
                    limit,
                });
            }
            if counter
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(QuotaDecision {
                    current: next,
                    limit,
                    remaining: limit - next,
                });
            }
            // Lost the race; reload and try again.
        }
    }

    /// Returns `delta` units on deletion of a business entity. The counter
    /// never goes below zero.
    pub fn release(&self, tenant_id: Uuid, kind: ResourceKind, delta: i64) {
        let counter = self.counter(tenant_id, kind);
        loop {
            let current = counter.load(Ordering::Acquire);
            let next = (current - delta).max(0);
            if counter
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Current usage for a tenant and kind.
    pub fn usage(&self, tenant_id: Uuid, kind: ResourceKind) -> i64 {
        self.counter(tenant_id, kind).load(Ordering::Acquire)
    }

    /// Pre-creates zeroed counters for every resource kind — the local
    /// effect of the pool model's `allocate_counter_namespace` step.
    pub fn allocate_namespace(&self, tenant_id: Uuid) {
        for kind in ResourceKind::ALL {
            self.counter(tenant_id, kind);
        }
    }

    /// Removes a tenant's counters on offboarding.
    pub fn drop_namespace(&self, tenant_id: Uuid) {
        self.counters.retain(|(id, _), _| *id != tenant_id);
    }

    fn counter(&self, tenant_id: Uuid, kind: ResourceKind) -> Arc<AtomicI64> {
        self.counters
            .entry((tenant_id, kind))
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    async fn limit_for(&self, tenant_id: Uuid, kind: ResourceKind) -> EngineResult<i64> {
        let lookup = self.store.get(tenant_id);
        match tokio::time::timeout(self.registry_timeout, lookup).await {
            Ok(Ok(tenant)) => Ok(tenant.limit_for(kind)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EngineError::RegistryTimeout(self.registry_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::{IsolationModel, TenantDraft, TenantTier, TierLimits};
    use crate::registry::MemoryStore;

    async fn tenant_with_limit(
        store: &Arc<MemoryStore>,
        tier: TenantTier,
        max_products: i64,
    ) -> Uuid {
        let tenant = store
            .create(TenantDraft {
                company_name: "Acme Corp".to_string(),
                admin_email: format!("admin+{}@acme.test", Uuid::new_v4()),
                tier,
                isolation_model: IsolationModel::Pool,
            })
            .await
            .unwrap();
        store
            .update(tenant.tenant_id, tenant.version, &move |t| {
                t.limits.max_products = max_products;
            })
            .await
            .unwrap();
        tenant.tenant_id
    }

    #[tokio::test]
    async fn test_authorize_up_to_limit_then_reject() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, 5).await;
        let enforcer = QuotaEnforcer::new(store);

        for i in 1..=5 {
            let decision = enforcer
                .authorize(tenant_id, ResourceKind::Products, 1)
                .await
                .unwrap();
            assert_eq!(decision.current, i);
        }

        let err = enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QuotaExceeded { .. }));
        assert_eq!(enforcer.usage(tenant_id, ResourceKind::Products), 5);
    }

    #[tokio::test]
    async fn test_concurrent_authorize_exactly_limit_succeed() {
        // N concurrent requests against limit N-1: exactly N-1 succeed,
        // exactly 1 is rejected. Never N, never fewer.
        const N: usize = 16;
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, (N - 1) as i64).await;
        let enforcer = Arc::new(QuotaEnforcer::new(store));

        let mut handles = Vec::new();
        for _ in 0..N {
            let enforcer = enforcer.clone();
            handles.push(tokio::spawn(async move {
                enforcer
                    .authorize(tenant_id, ResourceKind::Products, 1)
                    .await
            }));
        }

        let mut allowed = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => allowed += 1,
                Err(EngineError::QuotaExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(allowed, N - 1);
        assert_eq!(rejected, 1);
        assert_eq!(
            enforcer.usage(tenant_id, ResourceKind::Products),
            (N - 1) as i64
        );
    }

    #[tokio::test]
    async fn test_release_frees_headroom() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, 1).await;
        let enforcer = QuotaEnforcer::new(store);

        enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .unwrap();
        assert!(enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .is_err());

        enforcer.release(tenant_id, ResourceKind::Products, 1);
        assert!(enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_never_goes_negative() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, 10).await;
        let enforcer = QuotaEnforcer::new(store);

        enforcer.release(tenant_id, ResourceKind::Products, 100);
        assert_eq!(enforcer.usage(tenant_id, ResourceKind::Products), 0);
    }

    #[tokio::test]
    async fn test_unlimited_tier_never_rejects() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Enterprise, UNLIMITED).await;
        let enforcer = QuotaEnforcer::new(store);

        for _ in 0..1_000 {
            enforcer
                .authorize(tenant_id, ResourceKind::Products, 1)
                .await
                .unwrap();
        }
        assert_eq!(enforcer.usage(tenant_id, ResourceKind::Products), 1_000);
    }

    #[tokio::test]
    async fn test_tier_upgrade_affects_future_checks_only() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, 2).await;
        let enforcer = QuotaEnforcer::new(store.clone());

        enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .unwrap();
        enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .unwrap();
        assert!(enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .is_err());

        // Upgrade: existing usage is untouched, new headroom appears.
        let current = store.get(tenant_id).await.unwrap();
        store
            .update(tenant_id, current.version, &|t| {
                t.change_tier(TenantTier::Premium);
            })
            .await
            .unwrap();

        assert_eq!(enforcer.usage(tenant_id, ResourceKind::Products), 2);
        assert!(enforcer
            .authorize(tenant_id, ResourceKind::Products, 1)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_namespace_allocate_and_drop() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = tenant_with_limit(&store, TenantTier::Basic, 10).await;
        let enforcer = QuotaEnforcer::new(store);

        enforcer.allocate_namespace(tenant_id);
        assert_eq!(enforcer.counters.len(), ResourceKind::ALL.len());

        enforcer.drop_namespace(tenant_id);
        assert!(enforcer.counters.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let enforcer = QuotaEnforcer::new(store);
        let err = enforcer
            .authorize(Uuid::new_v4(), ResourceKind::Products, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_default_limits_match_tier_table() {
        let limits = TierLimits::for_tier(TenantTier::Basic);
        assert_eq!(limits.get(ResourceKind::ApiCalls), 1_000);
    }
}
