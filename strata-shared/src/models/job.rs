/// Provisioning jobs and step sequences
///
/// A `ProvisioningJob` is one in-flight lifecycle transition: the ordered
/// list of steps for the tenant's isolation model plus a cursor, per-step
/// attempt count, last error, and overall deadline. The explicit
/// step-list-plus-cursor shape (rather than an implicit call stack) is what
/// makes a crashed pipeline resumable: restart picks up at the cursor and
/// never re-executes completed work.
///
/// # Step sequences
///
/// - pool:   `allocate_counter_namespace`
/// - bridge: `create_schema` → `seed_baseline`
/// - silo:   `allocate_network` → `allocate_database` → `allocate_compute`
///           → `allocate_gateway` → `update_routing` → `notify_complete`
///
/// Silo steps execute strictly in order; step N+1 never starts before
/// step N reports success.

use crate::models::binding::{schema_name_for, ResourceBinding};
use crate::models::tenant::{IsolationModel, Tenant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use uuid::Uuid;

/// One step of a provisioning pipeline.
///
/// Closed set; the orchestrator and the binding mutation dispatch on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    AllocateCounterNamespace,
    CreateSchema,
    SeedBaseline,
    AllocateNetwork,
    AllocateDatabase,
    AllocateCompute,
    AllocateGateway,
    UpdateRouting,
    NotifyComplete,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::AllocateCounterNamespace => "allocate_counter_namespace",
            ProvisionStep::CreateSchema => "create_schema",
            ProvisionStep::SeedBaseline => "seed_baseline",
            ProvisionStep::AllocateNetwork => "allocate_network",
            ProvisionStep::AllocateDatabase => "allocate_database",
            ProvisionStep::AllocateCompute => "allocate_compute",
            ProvisionStep::AllocateGateway => "allocate_gateway",
            ProvisionStep::UpdateRouting => "update_routing",
            ProvisionStep::NotifyComplete => "notify_complete",
        }
    }

    /// Ordered step sequence for an isolation model.
    pub fn sequence_for(model: IsolationModel) -> Vec<ProvisionStep> {
        match model {
            IsolationModel::Pool => vec![ProvisionStep::AllocateCounterNamespace],
            IsolationModel::Bridge => vec![
                ProvisionStep::CreateSchema,
                ProvisionStep::SeedBaseline,
            ],
            IsolationModel::Silo => vec![
                ProvisionStep::AllocateNetwork,
                ProvisionStep::AllocateDatabase,
                ProvisionStep::AllocateCompute,
                ProvisionStep::AllocateGateway,
                ProvisionStep::UpdateRouting,
                ProvisionStep::NotifyComplete,
            ],
        }
    }

    /// Backend parameters for executing this step against a tenant.
    ///
    /// Everything a backend needs is derived from the tenant record;
    /// admin-supplied text never becomes a structural identifier.
    pub fn params(&self, tenant: &Tenant) -> JsonValue {
        match self {
            ProvisionStep::AllocateCounterNamespace => json!({
                "tenant_id": tenant.tenant_id,
            }),
            ProvisionStep::CreateSchema => json!({
                "schema_name": schema_name_for(tenant.tenant_id),
            }),
            ProvisionStep::SeedBaseline => json!({
                "schema_name": schema_name_for(tenant.tenant_id),
                "baseline_tables": ["users", "products", "orders"],
            }),
            ProvisionStep::AllocateNetwork
            | ProvisionStep::AllocateDatabase
            | ProvisionStep::AllocateCompute
            | ProvisionStep::AllocateGateway
            | ProvisionStep::UpdateRouting => json!({
                "tenant_id": tenant.tenant_id,
                "tier": tenant.tier.as_str(),
            }),
            ProvisionStep::NotifyComplete => json!({
                "tenant_id": tenant.tenant_id,
                "admin_email": tenant.admin_email,
            }),
        }
    }

    /// Applies a successful step's outputs to the resource binding.
    ///
    /// Steps without a binding effect (seeding, compute, gateway,
    /// notification) leave it untouched.
    pub fn apply_outputs(&self, binding: &mut ResourceBinding, outputs: &JsonValue) {
        match self {
            ProvisionStep::AllocateCounterNamespace => {
                *binding = ResourceBinding::Pool;
            }
            ProvisionStep::CreateSchema => {
                if let ResourceBinding::Bridge { schema_name } = binding {
                    if let Some(name) = outputs.get("schema_name").and_then(|v| v.as_str()) {
                        *schema_name = name.to_string();
                    }
                }
            }
            ProvisionStep::AllocateNetwork => {
                if let ResourceBinding::Silo {
                    network_reference, ..
                } = binding
                {
                    *network_reference = outputs
                        .get("network_reference")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
            }
            ProvisionStep::AllocateDatabase => {
                if let ResourceBinding::Silo {
                    credential_reference,
                    ..
                } = binding
                {
                    *credential_reference = outputs
                        .get("credential_reference")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
            }
            ProvisionStep::UpdateRouting => {
                if let ResourceBinding::Silo {
                    dedicated_endpoint, ..
                } = binding
                {
                    *dedicated_endpoint = outputs
                        .get("endpoint")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
            }
            ProvisionStep::SeedBaseline
            | ProvisionStep::AllocateCompute
            | ProvisionStep::AllocateGateway
            | ProvisionStep::NotifyComplete => {}
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight lifecycle transition for a tenant.
///
/// Created when the tenant enters `provisioning`; archived once the
/// tenant reaches `active` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningJob {
    pub tenant_id: Uuid,

    pub isolation_model: IsolationModel,

    /// Ordered, model-specific step list
    pub steps: Vec<ProvisionStep>,

    /// Index of the next step to execute; steps before it are complete
    pub cursor: usize,

    /// Attempts made on the current step
    pub attempts_on_current: u32,

    /// Message from the most recent failure, if any
    pub last_error: Option<String>,

    /// Overall deadline; exceeding it fails the job regardless of the
    /// retry budget remaining on the current step
    pub deadline: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningJob {
    pub fn new(tenant_id: Uuid, model: IsolationModel, deadline: DateTime<Utc>) -> Self {
        let now = Utc::now();
        ProvisioningJob {
            tenant_id,
            isolation_model: model,
            steps: ProvisionStep::sequence_for(model),
            cursor: 0,
            attempts_on_current: 0,
            last_error: None,
            deadline,
            created_at: now,
            updated_at: now,
        }
    }

    /// The next step to execute, or `None` when all steps are complete.
    pub fn current_step(&self) -> Option<ProvisionStep> {
        self.steps.get(self.cursor).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Records a completed step and moves the cursor forward.
    pub fn advance(&mut self) {
        self.cursor += 1;
        self.attempts_on_current = 0;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Records a failed attempt on the current step.
    pub fn record_attempt(&mut self, error: impl Into<String>) {
        self.attempts_on_current += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn deadline_exceeded(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}
