//! # Strata Provisioner
//!
//! Worker binary that watches the tenant registry for `requested` tenants
//! and provisions them: counter namespaces for pool tenants, isolated
//! schemas for bridge tenants, and the dedicated-infrastructure pipeline
//! for silo tenants.
//!
//! ## Environment
//!
//! - `DATABASE_URL`: Postgres connection string (required)
//! - `PROVISIONING_BACKEND`: `mock` (default) or `http`
//! - `PROVISIONING_BACKEND_URL`: base URL for the `http` backend
//! - `LIFECYCLE_WEBHOOK_URL`: optional webhook endpoint for lifecycle
//!   events
//! - `RUST_LOG`: log filter (default: `strata_provisioner=debug`)
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p strata-provisioner
//! ```

use std::sync::Arc;
use std::time::Duration;
use strata_provisioner::backend::{HttpBackend, MockBackend, ProvisioningBackend};
use strata_provisioner::orchestrator::ProvisioningOrchestrator;
use strata_shared::events::{NotificationSink, TracingSink, WebhookSink};
use strata_shared::registry::{PgStore, TenantStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_provisioner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Strata provisioner v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    let store: Arc<dyn TenantStore> = Arc::new(PgStore::new(pool));

    let backend: Arc<dyn ProvisioningBackend> =
        match std::env::var("PROVISIONING_BACKEND").as_deref() {
            Ok("http") => {
                let base_url = std::env::var("PROVISIONING_BACKEND_URL").map_err(|_| {
                    anyhow::anyhow!("PROVISIONING_BACKEND_URL is required for the http backend")
                })?;
                Arc::new(HttpBackend::new(base_url, Duration::from_secs(120))?)
            }
            _ => Arc::new(MockBackend::new()),
        };

    let sink: Arc<dyn NotificationSink> = match std::env::var("LIFECYCLE_WEBHOOK_URL") {
        Ok(url) => Arc::new(WebhookSink::new(url)?),
        Err(_) => Arc::new(TracingSink),
    };

    let orchestrator = ProvisioningOrchestrator::new(store, backend).with_sink(sink);
    let shutdown = orchestrator.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    orchestrator.run().await
}
