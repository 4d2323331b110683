/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "registry": "reachable"
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use strata_shared::models::tenant::TenantStatus;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub registry: String,
}

/// Returns service health, including registry reachability.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let registry = match state.store.list_by_status(TenantStatus::Active, 1).await {
        Ok(_) => "reachable",
        Err(_) => "unreachable",
    };

    Ok(Json(HealthResponse {
        status: if registry == "reachable" {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        registry: registry.to_string(),
    }))
}
