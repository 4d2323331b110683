/// Application state and router builder
///
/// Wires the isolation engine together behind the HTTP surface: one
/// registry handle shared by the context resolver, the isolation router,
/// and the quota enforcer, plus the notification sink for admin-triggered
/// transitions.
///
/// # Router layout
///
/// ```text
/// /
/// ├── /health                        # health check (public)
/// └── /v1/tenants
///     ├── POST /                     # onboarding (public)
///     ├── GET  /:id/status           # status probe (public)
///     ├── GET  /:id                  # tenant record (claims)
///     ├── GET  /:id/usage            # quota usage (claims)
///     ├── POST /:id/suspend          # admin toggle (claims)
///     ├── POST /:id/resume           # admin toggle (claims)
///     └── DELETE /:id                # soft delete (claims)
/// ```

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use strata_shared::context::RequestContextResolver;
use strata_shared::events::NotificationSink;
use strata_shared::quota::QuotaEnforcer;
use strata_shared::registry::TenantStore;
use strata_shared::router::IsolationRouter;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned per request via Axum's `State` extractor; everything inside is
/// an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TenantStore>,
    pub resolver: Arc<RequestContextResolver>,
    pub isolation: Arc<IsolationRouter>,
    pub quota: Arc<QuotaEnforcer>,
    pub sink: Arc<dyn NotificationSink>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TenantStore>,
        sink: Arc<dyn NotificationSink>,
        registry_timeout: Duration,
    ) -> Self {
        AppState {
            resolver: Arc::new(RequestContextResolver::with_timeout(
                store.clone(),
                registry_timeout,
            )),
            isolation: Arc::new(IsolationRouter::with_timeout(
                store.clone(),
                registry_timeout,
            )),
            quota: Arc::new(QuotaEnforcer::with_timeout(store.clone(), registry_timeout)),
            store,
            sink,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/", post(routes::tenants::onboard))
        .route("/:id/status", get(routes::tenants::get_status));

    let guarded_routes = Router::new()
        .route("/:id", get(routes::tenants::get_tenant))
        .route("/:id", delete(routes::tenants::delete_tenant))
        .route("/:id/usage", get(routes::tenants::get_usage))
        .route("/:id/suspend", post(routes::tenants::suspend_tenant))
        .route("/:id/resume", post(routes::tenants::resume_tenant))
        .layer(axum::middleware::from_fn(
            crate::middleware::claims::require_claims,
        ));

    let tenant_routes = public_routes.merge(guarded_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1/tenants", tenant_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
