/// API route handlers
///
/// - `health`: service health
/// - `tenants`: onboarding, status probe, tenant admin

pub mod health;
pub mod tenants;
