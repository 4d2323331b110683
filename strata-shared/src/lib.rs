//! # Strata Shared Library
//!
//! Core of the tenant isolation & provisioning engine, shared by the API
//! server and the provisioner.
//!
//! ## Module Organization
//!
//! - `models`: tenant records, resource bindings, provisioning jobs
//! - `registry`: the tenant store (single source of truth), in-memory and
//!   Postgres implementations
//! - `context`: request-time tenant context resolution from verified
//!   identity claims
//! - `router`: isolation routing — which resource a tenant's data lives in
//!   and how access must be scoped
//! - `quota`: atomic tier-based quota enforcement
//! - `events`: lifecycle events and notification sinks
//! - `error`: the engine error taxonomy

pub mod context;
pub mod error;
pub mod events;
pub mod models;
pub mod quota;
pub mod registry;
pub mod router;

/// Current version of the Strata shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
