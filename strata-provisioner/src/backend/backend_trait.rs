/// Core ProvisioningBackend trait and types
///
/// The backend executes individual provisioning steps against real
/// infrastructure (or a simulation of it). The orchestrator never talks to
/// infrastructure directly; it hands the backend a `StepRequest` and acts
/// on the reported `StepOutcome`.
///
/// # Backend Contract
///
/// All backends must:
/// 1. Be idempotent for a given `(step, tenant_id)` pair — re-running a
///    step against partially created resources is safe and converges
/// 2. Classify failures as retryable (transient) or fatal (will not
///    succeed on retry)
/// 3. Return step outputs as JSON for the binding mutation
///
/// # Example
///
/// ```no_run
/// use strata_provisioner::backend::{ProvisioningBackend, StepRequest, StepOutcome};
/// use async_trait::async_trait;
///
/// struct NoopBackend;
///
/// #[async_trait]
/// impl ProvisioningBackend for NoopBackend {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     async fn execute_step(&self, req: StepRequest) -> StepOutcome {
///         StepOutcome::Success { outputs: serde_json::json!({}) }
///     }
/// }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strata_shared::models::job::ProvisionStep;
use uuid::Uuid;

/// One step execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub step: ProvisionStep,
    pub tenant_id: Uuid,
    pub params: JsonValue,
}

impl StepRequest {
    pub fn new(step: ProvisionStep, tenant_id: Uuid, params: JsonValue) -> Self {
        StepRequest {
            step,
            tenant_id,
            params,
        }
    }
}

/// Result of one step execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step completed; `outputs` feed the resource-binding mutation.
    Success { outputs: JsonValue },

    /// Transient failure; the orchestrator retries with backoff up to its
    /// attempt budget.
    Retryable { message: String },

    /// Permanent failure; retrying will not change the result. The job
    /// fails the tenant.
    Fatal { message: String },
}

impl StepOutcome {
    pub fn success(outputs: JsonValue) -> Self {
        StepOutcome::Success { outputs }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        StepOutcome::Retryable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StepOutcome::Fatal {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// Executes provisioning steps against infrastructure.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Backend name, for registry lookup and logging.
    fn name(&self) -> &str;

    /// Executes one step.
    ///
    /// Must be idempotent for a given `(step, tenant_id)` pair: the
    /// orchestrator may re-invoke a step whose previous attempt timed out
    /// after partially completing.
    async fn execute_step(&self, req: StepRequest) -> StepOutcome;
}
