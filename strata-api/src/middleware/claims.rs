/// Gateway-claims middleware
///
/// The engine sits behind an identity-aware gateway that verifies tokens
/// before they reach us. This middleware extracts the verified claim set
/// from the request and adds it to request extensions; it does not (and
/// must not) perform cryptographic verification itself.
///
/// Sources, in order:
///
/// 1. `Authorization: Bearer <token>` — decoded without signature
///    verification (the gateway already verified it)
/// 2. `X-Tenant-Id` / `X-Tenant-Tier` headers — set by gateways that
///    translate claims into headers
///
/// Routes that require claims use `require_claims`; public routes (health,
/// onboarding, the status probe) skip this layer entirely.

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use strata_shared::context::{decode_gateway_claims, VerifiedClaims};
use strata_shared::models::tenant::TenantTier;
use uuid::Uuid;

use crate::error::ApiError;

/// Extracts claims from a request, if any are present.
pub fn extract_claims(req: &Request) -> Option<VerifiedClaims> {
    if let Some(token) = bearer_token(req) {
        return decode_gateway_claims(token).ok();
    }

    let tenant_id = req
        .headers()
        .get("X-Tenant-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());

    tenant_id.map(|tenant_id| VerifiedClaims {
        tenant_id: Some(tenant_id),
        tenant_tier: req
            .headers()
            .get("X-Tenant-Tier")
            .and_then(|v| v.to_str().ok())
            .and_then(TenantTier::parse),
        subject: None,
    })
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware for claim-guarded routes: 401 without a usable claim set.
pub async fn require_claims(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = extract_claims(&req)
        .ok_or_else(|| ApiError::Unauthorized("missing tenant credentials".to_string()))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
