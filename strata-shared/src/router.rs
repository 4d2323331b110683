/// Isolation routing
///
/// Given a `TenantContext`, the router answers exactly one question: where
/// does this tenant's data live, and how must access be scoped? The answer
/// is a `ScopedBinding` whose embedded tenant id is guaranteed to match the
/// input context — the single most important correctness property of the
/// engine. A mismatch is an `IsolationViolation`: an internal-consistency
/// bug that aborts the request and raises an alert, never a fallback.
///
/// Resolution rules per model:
///
/// - **pool**: fixed shared-resource descriptor plus a mandatory
///   `TenantFilter` marker. The filter type can only be constructed here,
///   so downstream code cannot silently omit the tenant-id predicate.
/// - **bridge**: the tenant's schema name; refuses with `BindingNotReady`
///   if the schema was never recorded (unreachable after the resolver's
///   `TenantNotActive` guard, re-checked defensively anyway).
/// - **silo**: dedicated endpoint and credential/network references, with
///   a version-keyed cache of recently resolved bindings. Every resolve
///   re-reads the record (single point lookup); a non-active status evicts
///   the cache entry immediately — serving a stale dedicated endpoint
///   would be a severe isolation violation.
///
/// Tenants that are not `active` (provisioning, suspended, failed) are
/// not-ready: the router refuses them uniformly.

use crate::error::{EngineError, EngineResult};
use crate::models::binding::{ResourceBinding, TenantFilter, SHARED_POOL_RESOURCE};
use crate::models::tenant::{IsolationModel, Tenant, TenantStatus};
use crate::registry::TenantStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Where and how a tenant's data must be accessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedBinding {
    tenant_id: Uuid,
    scope: BindingScope,
}

impl ScopedBinding {
    /// The tenant this binding was resolved for. Always equal to the
    /// requesting context's tenant id.
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn scope(&self) -> &BindingScope {
        &self.scope
    }
}

/// Variant-specific scoping payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingScope {
    /// Shared resource; every data access must carry the filter.
    SharedPool {
        resource: &'static str,
        filter: TenantFilter,
    },

    /// Isolated schema in the shared resource.
    Schema { schema_name: String },

    /// Fully dedicated infrastructure.
    Dedicated {
        endpoint: String,
        credential_reference: String,
        network_reference: String,
    },
}

#[derive(Clone)]
struct CachedDedicated {
    version: u64,
    scope: BindingScope,
}

pub struct IsolationRouter {
    store: Arc<dyn TenantStore>,
    registry_timeout: Duration,
    dedicated_cache: DashMap<Uuid, CachedDedicated>,
}

impl IsolationRouter {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        IsolationRouter {
            store,
            registry_timeout: crate::context::DEFAULT_REGISTRY_TIMEOUT,
            dedicated_cache: DashMap::new(),
        }
    }

    pub fn with_timeout(store: Arc<dyn TenantStore>, registry_timeout: Duration) -> Self {
        IsolationRouter {
            store,
            registry_timeout,
            dedicated_cache: DashMap::new(),
        }
    }

    /// Resolves the concrete binding for a tenant context.
    pub async fn resolve(
        &self,
        ctx: &crate::context::TenantContext,
    ) -> EngineResult<ScopedBinding> {
        let tenant = self.lookup(ctx.tenant_id).await?;

        if tenant.status != TenantStatus::Active {
            self.dedicated_cache.remove(&tenant.tenant_id);
            return Err(EngineError::BindingNotReady {
                tenant_id: tenant.tenant_id,
                reason: format!("tenant status is {}", tenant.status),
            });
        }

        let scoped = match tenant.isolation_model {
            IsolationModel::Pool => ScopedBinding {
                tenant_id: tenant.tenant_id,
                scope: BindingScope::SharedPool {
                    resource: SHARED_POOL_RESOURCE,
                    filter: TenantFilter::new(tenant.tenant_id),
                },
            },
            IsolationModel::Bridge => self.bridge_binding(&tenant)?,
            IsolationModel::Silo => self.dedicated_binding(&tenant)?,
        };

        self.verify_association(ctx.tenant_id, &scoped)?;
        Ok(scoped)
    }

    /// Drops any cached binding for a tenant. Called by admin operations
    /// (suspend, delete) so the cache never outlives a status change they
    /// just made.
    pub fn invalidate(&self, tenant_id: Uuid) {
        self.dedicated_cache.remove(&tenant_id);
    }

    fn bridge_binding(&self, tenant: &Tenant) -> EngineResult<ScopedBinding> {
        match &tenant.resource_binding {
            Some(ResourceBinding::Bridge { schema_name }) if !schema_name.is_empty() => {
                Ok(ScopedBinding {
                    tenant_id: tenant.tenant_id,
                    scope: BindingScope::Schema {
                        schema_name: schema_name.clone(),
                    },
                })
            }
            _ => Err(EngineError::BindingNotReady {
                tenant_id: tenant.tenant_id,
                reason: "schema name not recorded".to_string(),
            }),
        }
    }

    fn dedicated_binding(&self, tenant: &Tenant) -> EngineResult<ScopedBinding> {
        if let Some(cached) = self.dedicated_cache.get(&tenant.tenant_id) {
            if cached.version == tenant.version {
                return Ok(ScopedBinding {
                    tenant_id: tenant.tenant_id,
                    scope: cached.scope.clone(),
                });
            }
        }

        let scope = match &tenant.resource_binding {
            Some(ResourceBinding::Silo {
                dedicated_endpoint: Some(endpoint),
                credential_reference: Some(credential),
                network_reference: Some(network),
            }) => BindingScope::Dedicated {
                endpoint: endpoint.clone(),
                credential_reference: credential.clone(),
                network_reference: network.clone(),
            },
            _ => {
                return Err(EngineError::BindingNotReady {
                    tenant_id: tenant.tenant_id,
                    reason: "dedicated resources not fully provisioned".to_string(),
                })
            }
        };

        self.dedicated_cache.insert(
            tenant.tenant_id,
            CachedDedicated {
                version: tenant.version,
                scope: scope.clone(),
            },
        );

        Ok(ScopedBinding {
            tenant_id: tenant.tenant_id,
            scope,
        })
    }

    fn verify_association(&self, requested: Uuid, scoped: &ScopedBinding) -> EngineResult<()> {
        let bound = scoped.tenant_id();
        let filter_ok = match scoped.scope() {
            BindingScope::SharedPool { filter, .. } => filter.tenant_id() == requested,
            _ => true,
        };

        if bound != requested || !filter_ok {
            tracing::error!(
                requested = %requested,
                bound = %bound,
                "isolation violation: resolved binding does not belong to the requesting tenant"
            );
            return Err(EngineError::IsolationViolation { requested, bound });
        }
        Ok(())
    }

    async fn lookup(&self, tenant_id: Uuid) -> EngineResult<Tenant> {
        match tokio::time::timeout(self.registry_timeout, self.store.get(tenant_id)).await {
            Ok(Ok(tenant)) => Ok(tenant),
            Ok(Err(EngineError::NotFound(id))) => Err(EngineError::UnknownTenant(id)),
            Ok(Err(other)) => Err(other),
            Err(_) => Err(EngineError::RegistryTimeout(self.registry_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TenantContext;
    use crate::models::tenant::{TenantDraft, TenantTier};
    use crate::registry::MemoryStore;

    async fn active_tenant(store: &Arc<MemoryStore>, model: IsolationModel) -> Tenant {
        let tenant = store
            .create(TenantDraft {
                company_name: "Acme Corp".to_string(),
                admin_email: format!("admin+{}@acme.test", Uuid::new_v4()),
                tier: TenantTier::Basic,
                isolation_model: model,
            })
            .await
            .unwrap();
        let t = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.status = TenantStatus::Provisioning;
            })
            .await
            .unwrap();
        store
            .update(t.tenant_id, t.version, &move |t| {
                t.status = TenantStatus::Active;
                t.resource_binding = Some(match model {
                    IsolationModel::Pool => ResourceBinding::Pool,
                    IsolationModel::Bridge => ResourceBinding::Bridge {
                        schema_name: crate::models::binding::schema_name_for(t.tenant_id),
                    },
                    IsolationModel::Silo => ResourceBinding::Silo {
                        dedicated_endpoint: Some("t.example.internal:5432".to_string()),
                        credential_reference: Some("secret://t/db".to_string()),
                        network_reference: Some("net-t".to_string()),
                    },
                });
            })
            .await
            .unwrap()
    }

    fn ctx_for(tenant: &Tenant) -> TenantContext {
        TenantContext {
            tenant_id: tenant.tenant_id,
            tier: tenant.tier,
            isolation_model: tenant.isolation_model,
        }
    }

    #[tokio::test]
    async fn test_pool_binding_carries_mandatory_filter() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Pool).await;
        let router = IsolationRouter::new(store);

        let scoped = router.resolve(&ctx_for(&tenant)).await.unwrap();
        assert_eq!(scoped.tenant_id(), tenant.tenant_id);
        match scoped.scope() {
            BindingScope::SharedPool { resource, filter } => {
                assert_eq!(*resource, SHARED_POOL_RESOURCE);
                assert_eq!(filter.tenant_id(), tenant.tenant_id);
            }
            other => panic!("expected shared pool scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bridge_binding_returns_schema() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Bridge).await;
        let router = IsolationRouter::new(store);

        let scoped = router.resolve(&ctx_for(&tenant)).await.unwrap();
        match scoped.scope() {
            BindingScope::Schema { schema_name } => {
                assert!(schema_name.starts_with("tenant_"));
            }
            other => panic!("expected schema scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bridge_without_schema_not_ready() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Bridge).await;
        // Wipe the schema name to simulate an incomplete binding.
        let tenant = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.resource_binding = Some(ResourceBinding::Bridge {
                    schema_name: String::new(),
                });
            })
            .await
            .unwrap();

        let router = IsolationRouter::new(store);
        let err = router.resolve(&ctx_for(&tenant)).await.unwrap_err();
        assert!(matches!(err, EngineError::BindingNotReady { .. }));
    }

    #[tokio::test]
    async fn test_non_active_tenant_not_ready() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Pool).await;
        let tenant = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.status = TenantStatus::Suspended;
            })
            .await
            .unwrap();

        let router = IsolationRouter::new(store);
        let err = router.resolve(&ctx_for(&tenant)).await.unwrap_err();
        assert!(matches!(err, EngineError::BindingNotReady { .. }));
    }

    #[tokio::test]
    async fn test_dedicated_binding_cached_and_evicted_on_suspend() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Silo).await;
        let router = IsolationRouter::new(store.clone());

        // First resolve populates the cache.
        let first = router.resolve(&ctx_for(&tenant)).await.unwrap();
        assert!(router.dedicated_cache.contains_key(&tenant.tenant_id));

        // Second resolve hits the cache and returns the same scope.
        let second = router.resolve(&ctx_for(&tenant)).await.unwrap();
        assert_eq!(first, second);

        // Suspension must evict the moment the router observes it.
        let tenant = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.status = TenantStatus::Suspended;
            })
            .await
            .unwrap();
        let err = router.resolve(&ctx_for(&tenant)).await.unwrap_err();
        assert!(matches!(err, EngineError::BindingNotReady { .. }));
        assert!(!router.dedicated_cache.contains_key(&tenant.tenant_id));
    }

    #[tokio::test]
    async fn test_dedicated_cache_ignores_stale_version() {
        let store = Arc::new(MemoryStore::new());
        let tenant = active_tenant(&store, IsolationModel::Silo).await;
        let router = IsolationRouter::new(store.clone());

        router.resolve(&ctx_for(&tenant)).await.unwrap();

        // A record change (same status) bumps the version; the cached
        // entry must be rebuilt, not served stale.
        let tenant = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.resource_binding = Some(ResourceBinding::Silo {
                    dedicated_endpoint: Some("moved.example.internal:5432".to_string()),
                    credential_reference: Some("secret://t/db-2".to_string()),
                    network_reference: Some("net-t-2".to_string()),
                });
            })
            .await
            .unwrap();

        let scoped = router.resolve(&ctx_for(&tenant)).await.unwrap();
        match scoped.scope() {
            BindingScope::Dedicated { endpoint, .. } => {
                assert_eq!(endpoint, "moved.example.internal:5432");
            }
            other => panic!("expected dedicated scope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binding_always_matches_requesting_tenant() {
        let store = Arc::new(MemoryStore::new());
        let a = active_tenant(&store, IsolationModel::Pool).await;
        let b = active_tenant(&store, IsolationModel::Silo).await;
        let router = IsolationRouter::new(store);

        for tenant in [&a, &b] {
            let scoped = router.resolve(&ctx_for(tenant)).await.unwrap();
            assert_eq!(scoped.tenant_id(), tenant.tenant_id);
        }
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let store = Arc::new(MemoryStore::new());
        let router = IsolationRouter::new(store);
        let ctx = TenantContext {
            tenant_id: Uuid::new_v4(),
            tier: TenantTier::Basic,
            isolation_model: IsolationModel::Pool,
        };
        let err = router.resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownTenant(_)));
    }
}
