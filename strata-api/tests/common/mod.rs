/// Shared test harness for API integration tests
///
/// Builds the full API router over the in-memory registry plus a
/// provisioning orchestrator on the mock backend, so tests can drive the
/// whole onboard → provision → route lifecycle in-process.

use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use strata_api::app::{build_router, AppState};
use strata_provisioner::backend::MockBackend;
use strata_provisioner::orchestrator::{OrchestratorConfig, ProvisioningOrchestrator};
use strata_shared::events::TracingSink;
use strata_shared::models::tenant::TenantTier;
use strata_shared::registry::MemoryStore;
use uuid::Uuid;

pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<MockBackend>,
    pub orchestrator: ProvisioningOrchestrator,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_backend(MockBackend::new())
    }

    pub fn with_backend(backend: MockBackend) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(backend);

        let state = AppState::new(
            store.clone(),
            Arc::new(TracingSink),
            Duration::from_secs(2),
        );
        let orchestrator = ProvisioningOrchestrator::with_config(
            store.clone(),
            backend.clone(),
            OrchestratorConfig::fast(),
        );

        TestContext {
            app: build_router(state),
            store,
            backend,
            orchestrator,
        }
    }

    /// Bearer header carrying gateway-style claims for a tenant. The
    /// token is signed with a throwaway secret; the API decodes without
    /// verification, exactly as it does behind the real gateway.
    pub fn auth_header(&self, tenant_id: Uuid, tier: TenantTier) -> String {
        let token = encode(
            &Header::default(),
            &json!({
                "sub": "test-admin",
                "custom:tenant_id": tenant_id.to_string(),
                "custom:tenant_tier": tier.as_str(),
            }),
            &EncodingKey::from_secret(b"test-gateway-secret"),
        )
        .unwrap();
        format!("Bearer {token}")
    }
}
