//! # Strata API Server
//!
//! Exposes tenant onboarding, the provisioning status probe, and tenant
//! admin operations over HTTP. Sits behind an identity-aware gateway that
//! verifies tokens; this process consumes the verified claims.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p strata-api
//! ```

use std::sync::Arc;
use strata_api::{
    app::{build_router, AppState},
    config::Config,
};
use strata_shared::events::{NotificationSink, TracingSink, WebhookSink};
use strata_shared::registry::PgStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Strata API server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let sink: Arc<dyn NotificationSink> = match &config.engine.lifecycle_webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())?),
        None => Arc::new(TracingSink),
    };

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        sink,
        config.engine.registry_timeout(),
    );
    let app = build_router(state);

    let bind_address = config.bind_address();
    tracing::info!("server listening on http://{bind_address}");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
