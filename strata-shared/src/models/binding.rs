/// Resource bindings and tenant scoping markers
///
/// A `ResourceBinding` describes where a tenant's data lives. It is a
/// closed set of three cases matching the isolation models, dispatched
/// explicitly wherever it is consumed; the set of models is fixed and
/// exhaustive-match checking is the point.
///
/// Bridge schema names are derived from the tenant id through a fixed,
/// injection-safe transformation (`schema_name_for`). Admin-supplied text
/// is never interpolated into structural identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical name of the shared pool resource that all pool-model tenants
/// live in.
pub const SHARED_POOL_RESOURCE: &str = "strata_pool";

/// Isolation-model-specific descriptor of a tenant's data location.
///
/// Populated progressively during provisioning; only usable once the
/// tenant is `active` (the router re-checks readiness defensively).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ResourceBinding {
    /// Shared resource; access scoped by tenant-id equality filtering.
    Pool,

    /// Isolated schema in the shared resource, shared connection pool.
    Bridge { schema_name: String },

    /// Fully dedicated infrastructure. Fields are `None` until their
    /// provisioning step completes.
    Silo {
        dedicated_endpoint: Option<String>,
        credential_reference: Option<String>,
        network_reference: Option<String>,
    },
}

impl ResourceBinding {
    /// Empty binding for a model, the starting point for provisioning.
    pub fn initial(model: crate::models::tenant::IsolationModel) -> Self {
        use crate::models::tenant::IsolationModel;
        match model {
            IsolationModel::Pool => ResourceBinding::Pool,
            IsolationModel::Bridge => ResourceBinding::Bridge {
                schema_name: String::new(),
            },
            IsolationModel::Silo => ResourceBinding::Silo {
                dedicated_endpoint: None,
                credential_reference: None,
                network_reference: None,
            },
        }
    }

    /// Whether every field required by the model has been populated.
    pub fn is_ready(&self) -> bool {
        match self {
            ResourceBinding::Pool => true,
            ResourceBinding::Bridge { schema_name } => !schema_name.is_empty(),
            ResourceBinding::Silo {
                dedicated_endpoint,
                credential_reference,
                network_reference,
            } => {
                dedicated_endpoint.is_some()
                    && credential_reference.is_some()
                    && network_reference.is_some()
            }
        }
    }
}

/// Mandatory tenant-id filter marker for pool-model data access.
///
/// The only way to obtain one is from the isolation router, so downstream
/// code cannot construct (or omit) its own scoping. Every pool-model data
/// access must include `tenant_id = filter.tenant_id()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantFilter {
    tenant_id: Uuid,
}

impl TenantFilter {
    pub(crate) fn new(tenant_id: Uuid) -> Self {
        TenantFilter { tenant_id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Renders the filter as an equality predicate fragment with the
    /// tenant id as a bound value, e.g. for a query builder.
    pub fn as_predicate(&self) -> (&'static str, Uuid) {
        ("tenant_id", self.tenant_id)
    }
}

/// Derives the bridge schema name for a tenant.
///
/// UUIDs only contain `[0-9a-f-]`; hyphens map to underscores, giving an
/// identifier restricted to `[a-z0-9_]`. No other input reaches the name.
pub fn schema_name_for(tenant_id: Uuid) -> String {
    let hex = tenant_id.as_hyphenated().to_string().replace('-', "_");
    format!("tenant_{hex}")
}

/// True if `s` is a safe structural identifier: non-empty, starts with a
/// letter or underscore, and contains only `[a-z0-9_]`.
pub fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::IsolationModel;

    #[test]
    fn test_initial_bindings_not_ready_until_populated() {
        assert!(ResourceBinding::initial(IsolationModel::Pool).is_ready());
        assert!(!ResourceBinding::initial(IsolationModel::Bridge).is_ready());
        assert!(!ResourceBinding::initial(IsolationModel::Silo).is_ready());
    }

    #[test]
    fn test_silo_ready_requires_all_fields() {
        let binding = ResourceBinding::Silo {
            dedicated_endpoint: Some("db-x.internal:5432".to_string()),
            credential_reference: Some("secret://tenants/x/db".to_string()),
            network_reference: None,
        };
        assert!(!binding.is_ready());

        let binding = ResourceBinding::Silo {
            dedicated_endpoint: Some("db-x.internal:5432".to_string()),
            credential_reference: Some("secret://tenants/x/db".to_string()),
            network_reference: Some("net-x".to_string()),
        };
        assert!(binding.is_ready());
    }

    #[test]
    fn test_schema_name_is_deterministic_and_safe() {
        let id = Uuid::new_v4();
        let a = schema_name_for(id);
        let b = schema_name_for(id);
        assert_eq!(a, b);
        assert!(a.starts_with("tenant_"));
        assert!(is_safe_identifier(&a), "unsafe identifier: {a}");
        assert!(!a.contains('-'));
    }

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("tenant_abc123"));
        assert!(is_safe_identifier("_private"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("1tenant"));
        assert!(!is_safe_identifier("tenant-abc"));
        assert!(!is_safe_identifier("tenant abc"));
        assert!(!is_safe_identifier("Tenant"));
        assert!(!is_safe_identifier("t;DROP TABLE tenants"));
    }

    #[test]
    fn test_binding_serde_tagged() {
        let binding = ResourceBinding::Bridge {
            schema_name: "tenant_x".to_string(),
        };
        let json = serde_json::to_string(&binding).unwrap();
        assert!(json.contains("\"model\":\"bridge\""));

        let back: ResourceBinding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, binding);
    }
}
