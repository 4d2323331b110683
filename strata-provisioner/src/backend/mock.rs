/// Mock provisioning backend for testing and demos
///
/// Simulates infrastructure step execution without external dependencies.
/// Outputs are derived deterministically from the tenant id, so re-running
/// a step always converges on the same result — idempotency by
/// construction.
///
/// # Failure scripting
///
/// Tests script failures per step: `fail_retryable(step, n)` makes the
/// first `n` attempts of that step return a retryable error before
/// succeeding; `fail_fatal(step)` makes the step permanently fatal.
///
/// Every invocation is recorded and can be inspected with `invocations()`,
/// which is how resumption tests assert that a completed step is never
/// re-executed.
///
/// # Example
///
/// ```no_run
/// use strata_provisioner::backend::{MockBackend, ProvisioningBackend, StepRequest};
/// use strata_shared::models::job::ProvisionStep;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let backend = MockBackend::new();
/// backend.fail_retryable(ProvisionStep::AllocateDatabase, 2);
///
/// let req = StepRequest::new(
///     ProvisionStep::AllocateDatabase,
///     Uuid::new_v4(),
///     serde_json::json!({}),
/// );
/// let outcome = backend.execute_step(req).await; // first attempt: retryable
/// # }
/// ```

use crate::backend::{ProvisioningBackend, StepOutcome, StepRequest};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use strata_shared::models::binding::schema_name_for;
use strata_shared::models::job::ProvisionStep;
use tokio::time::sleep;
use uuid::Uuid;

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub step: ProvisionStep,
    pub tenant_id: Uuid,
}

pub struct MockBackend {
    /// Remaining retryable failures per step
    retryable_budget: DashMap<ProvisionStep, AtomicU32>,

    /// Steps that fail fatally
    fatal_steps: DashMap<ProvisionStep, ()>,

    /// Simulated per-step latency
    step_latency: Duration,

    /// Every execute_step call, in order
    invocations: Mutex<Vec<Invocation>>,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            retryable_budget: DashMap::new(),
            fatal_steps: DashMap::new(),
            step_latency: Duration::from_millis(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Adds simulated latency to every step, e.g. to exercise deadlines.
    pub fn with_latency(step_latency: Duration) -> Self {
        MockBackend {
            step_latency,
            ..MockBackend::new()
        }
    }

    /// Scripts the next `attempts` invocations of `step` to fail
    /// retryably.
    pub fn fail_retryable(&self, step: ProvisionStep, attempts: u32) {
        self.retryable_budget.insert(step, AtomicU32::new(attempts));
    }

    /// Scripts `step` to fail fatally on every invocation.
    pub fn fail_fatal(&self, step: ProvisionStep) {
        self.fatal_steps.insert(step, ());
    }

    /// All invocations so far, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Number of invocations of one step.
    pub fn invocation_count(&self, step: ProvisionStep) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.step == step)
            .count()
    }

    fn outputs_for(step: ProvisionStep, tenant_id: Uuid) -> serde_json::Value {
        let short = tenant_id.as_simple().to_string();
        let short = &short[..8];
        match step {
            ProvisionStep::AllocateCounterNamespace => json!({
                "namespace": format!("counters-{short}"),
            }),
            ProvisionStep::CreateSchema => json!({
                "schema_name": schema_name_for(tenant_id),
            }),
            ProvisionStep::SeedBaseline => json!({
                "seeded_tables": ["users", "products", "orders"],
            }),
            ProvisionStep::AllocateNetwork => json!({
                "network_reference": format!("net-{short}"),
            }),
            ProvisionStep::AllocateDatabase => json!({
                "credential_reference": format!("secret://tenants/{short}/db"),
            }),
            ProvisionStep::AllocateCompute => json!({
                "compute_reference": format!("compute-{short}"),
            }),
            ProvisionStep::AllocateGateway => json!({
                "gateway_reference": format!("gw-{short}"),
            }),
            ProvisionStep::UpdateRouting => json!({
                "endpoint": format!("{short}.tenants.strata.internal"),
            }),
            ProvisionStep::NotifyComplete => json!({}),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProvisioningBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute_step(&self, req: StepRequest) -> StepOutcome {
        self.invocations.lock().push(Invocation {
            step: req.step,
            tenant_id: req.tenant_id,
        });

        if !self.step_latency.is_zero() {
            sleep(self.step_latency).await;
        }

        if self.fatal_steps.contains_key(&req.step) {
            return StepOutcome::fatal(format!("{} failed permanently", req.step));
        }

        if let Some(budget) = self.retryable_budget.get(&req.step) {
            let remaining = budget.load(Ordering::Acquire);
            if remaining > 0 {
                budget.fetch_sub(1, Ordering::AcqRel);
                return StepOutcome::retryable(format!(
                    "{} transiently unavailable ({} scripted failures left)",
                    req.step,
                    remaining - 1
                ));
            }
        }

        StepOutcome::success(Self::outputs_for(req.step, req.tenant_id))
    }
}
