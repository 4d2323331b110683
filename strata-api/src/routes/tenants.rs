/// Tenant lifecycle routes
///
/// Onboarding, the status probe, tenant reads, admin suspend/resume, and
/// soft deletion. Onboarding is a synchronous acknowledgement only: the
/// record is created in `requested` status and the provisioner takes it
/// from there; callers watch progress through the status probe.
///
/// Claims-guarded routes enforce that the authenticated tenant matches
/// the path — a mismatch is a 403, full stop.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_shared::context::VerifiedClaims;
use strata_shared::events::LifecycleEvent;
use strata_shared::models::tenant::{
    IsolationModel, ResourceKind, Tenant, TenantDraft, TenantStatus, TenantTier, TierLimits,
};
use strata_shared::registry::update_with_retry;
use uuid::Uuid;
use validator::Validate;

/// Attempt budget for admin writes that race on record versions.
const ADMIN_WRITE_ATTEMPTS: u32 = 5;

/// Onboarding request payload
#[derive(Debug, Deserialize, Validate)]
pub struct OnboardRequest {
    #[validate(length(min = 1, max = 255, message = "company_name must be 1-255 characters"))]
    pub company_name: String,

    #[validate(email(message = "admin_email must be a valid email address"))]
    pub admin_email: String,

    #[serde(default)]
    pub tier: TenantTier,

    #[serde(default)]
    pub isolation_model: IsolationModel,
}

/// Onboarding acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct OnboardResponse {
    pub tenant_id: Uuid,
    pub status: TenantStatus,
    pub tier: TenantTier,
    pub isolation_model: IsolationModel,
}

/// `POST /v1/tenants`
///
/// Creates the tenant record and acknowledges immediately; provisioning
/// proceeds asynchronously.
pub async fn onboard(
    State(state): State<AppState>,
    Json(payload): Json<OnboardRequest>,
) -> ApiResult<(StatusCode, Json<OnboardResponse>)> {
    payload.validate()?;

    let tenant = state
        .store
        .create(TenantDraft {
            company_name: payload.company_name,
            admin_email: payload.admin_email,
            tier: payload.tier,
            isolation_model: payload.isolation_model,
        })
        .await?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        tier = %tenant.tier,
        isolation_model = %tenant.isolation_model,
        "tenant onboarding accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(OnboardResponse {
            tenant_id: tenant.tenant_id,
            status: tenant.status,
            tier: tenant.tier,
            isolation_model: tenant.isolation_model,
        }),
    ))
}

/// Status probe response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub tenant_id: Uuid,
    pub status: TenantStatus,
    pub isolation_model: IsolationModel,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

/// `GET /v1/tenants/:id/status`
///
/// Public probe for onboarding callers: status, isolation model, and the
/// failing step if provisioning failed.
pub async fn get_status(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let tenant = state.store.get(tenant_id).await?;

    Ok(Json(StatusResponse {
        tenant_id: tenant.tenant_id,
        status: tenant.status,
        isolation_model: tenant.isolation_model,
        failed_step: tenant.last_failure.map(|f| f.step),
    }))
}

/// Sanitized tenant record
#[derive(Debug, Serialize, Deserialize)]
pub struct TenantResponse {
    pub tenant_id: Uuid,
    pub company_name: String,
    pub tier: TenantTier,
    pub isolation_model: IsolationModel,
    pub status: TenantStatus,
    pub limits: TierLimits,
    pub features: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tenant> for TenantResponse {
    fn from(tenant: Tenant) -> Self {
        TenantResponse {
            tenant_id: tenant.tenant_id,
            company_name: tenant.company_name,
            tier: tenant.tier,
            isolation_model: tenant.isolation_model,
            status: tenant.status,
            limits: tenant.limits,
            features: tenant.features,
            created_at: tenant.created_at,
            updated_at: tenant.updated_at,
        }
    }
}

/// `GET /v1/tenants/:id`
///
/// Full record for the authenticated tenant. Goes through the status-probe
/// resolution path so owners can watch their own provisioning.
pub async fn get_tenant(
    State(state): State<AppState>,
    Extension(claims): Extension<VerifiedClaims>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantResponse>> {
    authorize_tenant_access(&claims, tenant_id)?;
    state.resolver.resolve_status_probe(&claims).await?;

    let tenant = state.store.get(tenant_id).await?;
    Ok(Json(TenantResponse::from(tenant)))
}

/// Per-kind usage entry
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageEntry {
    pub kind: ResourceKind,
    pub usage: i64,
    pub limit: i64,
}

/// `GET /v1/tenants/:id/usage`
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(claims): Extension<VerifiedClaims>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<UsageEntry>>> {
    authorize_tenant_access(&claims, tenant_id)?;
    let tenant = state.store.get(tenant_id).await?;

    let entries = ResourceKind::ALL
        .into_iter()
        .map(|kind| UsageEntry {
            kind,
            usage: state.quota.usage(tenant_id, kind),
            limit: tenant.limit_for(kind),
        })
        .collect();

    Ok(Json(entries))
}

/// `POST /v1/tenants/:id/suspend`
///
/// Administrator-triggered; toggles status only, never re-runs
/// provisioning steps. Suspended tenants stop routing immediately.
pub async fn suspend_tenant(
    State(state): State<AppState>,
    Extension(claims): Extension<VerifiedClaims>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    authorize_tenant_access(&claims, tenant_id)?;
    let updated = transition(&state, tenant_id, TenantStatus::Suspended).await?;
    state.isolation.invalidate(tenant_id);
    Ok(Json(status_of(updated)))
}

/// `POST /v1/tenants/:id/resume`
pub async fn resume_tenant(
    State(state): State<AppState>,
    Extension(claims): Extension<VerifiedClaims>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    authorize_tenant_access(&claims, tenant_id)?;
    let updated = transition(&state, tenant_id, TenantStatus::Active).await?;
    Ok(Json(status_of(updated)))
}

/// `DELETE /v1/tenants/:id`
///
/// Soft delete: the record is preserved for audit; quota counters and any
/// cached bindings go away now. Cleanup of dedicated infrastructure is a
/// separate operator workflow.
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(claims): Extension<VerifiedClaims>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    authorize_tenant_access(&claims, tenant_id)?;

    let before = state.store.get(tenant_id).await?;
    let deleted = state.store.mark_deleted(tenant_id).await?;

    state.quota.drop_namespace(tenant_id);
    state.isolation.invalidate(tenant_id);
    state
        .sink
        .notify(LifecycleEvent::now(
            tenant_id,
            before.status,
            TenantStatus::Deleted,
        ))
        .await;

    tracing::info!(tenant_id = %tenant_id, "tenant soft-deleted");
    Ok(Json(status_of(deleted)))
}

fn authorize_tenant_access(claims: &VerifiedClaims, tenant_id: Uuid) -> ApiResult<()> {
    match claims.tenant_id {
        Some(claimed) if claimed == tenant_id => Ok(()),
        Some(_) => Err(ApiError::Forbidden(
            "access denied to tenant resource".to_string(),
        )),
        None => Err(ApiError::Unauthorized(
            "missing tenant_id claim".to_string(),
        )),
    }
}

async fn transition(
    state: &AppState,
    tenant_id: Uuid,
    to: TenantStatus,
) -> ApiResult<Tenant> {
    let before = state.store.get(tenant_id).await?;
    let updated = update_with_retry(&state.store, tenant_id, ADMIN_WRITE_ATTEMPTS, &move |t| {
        t.status = to;
    })
    .await?;

    state
        .sink
        .notify(LifecycleEvent::now(tenant_id, before.status, to))
        .await;

    Ok(updated)
}

fn status_of(tenant: Tenant) -> StatusResponse {
    StatusResponse {
        tenant_id: tenant.tenant_id,
        status: tenant.status,
        isolation_model: tenant.isolation_model,
        failed_step: tenant.last_failure.map(|f| f.step),
    }
}
