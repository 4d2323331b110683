/// Provisioning orchestrator
///
/// Drives tenants through the lifecycle state machine. The main loop polls
/// the registry for `requested` tenants, claims each one by transitioning
/// it to `provisioning` (an optimistic update, so concurrent orchestrators
/// never double-claim), and executes the isolation-model-specific step
/// sequence against the provisioning backend.
///
/// # Architecture
///
/// ```text
/// ProvisioningOrchestrator
///   ├─> TenantStore: poll for requested tenants, persist step results
///   ├─> ProvisioningBackend: execute steps (mock, http)
///   ├─> JobStore: cursor persistence for resumption
///   └─> NotificationSink: lifecycle events on every transition
/// ```
///
/// # Execution contract
///
/// - Steps run strictly in order; step N+1 never starts before step N
///   succeeds.
/// - Each step result is persisted (binding via `TenantStore::update`,
///   cursor via the job store) before the cursor advances, so a restart
///   resumes at the last completed step without re-executing finished
///   work.
/// - Retryable failures back off exponentially up to the configured
///   attempt budget; a step that exceeds its deadline counts as a
///   retryable failure.
/// - Exhausted retries, fatal outcomes, and an exceeded overall deadline
///   all transition the tenant to `failed` and stop. Completed steps are
///   NOT rolled back — cleanup of partially provisioned infrastructure is
///   a deliberate, separately triggered operation.
/// - A failed job never takes the loop down; other tenants' jobs continue.
///
/// # Concurrency
///
/// Jobs for different tenants run fully in parallel in their own Tokio
/// tasks; the registry's optimistic versioning is the only shared mutable
/// state.

use crate::backend::{ProvisioningBackend, StepOutcome, StepRequest};
use crate::jobs::JobStore;
use crate::retry::RetryPolicy;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_shared::error::{EngineError, EngineResult};
use strata_shared::events::{LifecycleEvent, NotificationSink, TracingSink};
use strata_shared::models::binding::ResourceBinding;
use strata_shared::models::job::{ProvisionStep, ProvisioningJob};
use strata_shared::models::tenant::{StepFailure, Tenant, TenantStatus};
use strata_shared::quota::QuotaEnforcer;
use strata_shared::registry::{update_with_retry, TenantStore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Poll interval when no work is available
    pub poll_interval: Duration,

    /// Maximum jobs in flight at once
    pub max_concurrent_jobs: usize,

    /// Tenants claimed per poll
    pub claim_batch_size: usize,

    /// Per-step deadline; an elapsed step counts as a retryable failure
    pub step_timeout: Duration,

    /// Overall job deadline from claim time
    pub job_deadline: Duration,

    /// Per-step retry budget and backoff shape
    pub retry: RetryPolicy,

    /// Attempt budget for registry writes that race on versions
    pub registry_write_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(1),
            max_concurrent_jobs: 10,
            claim_batch_size: 5,
            step_timeout: Duration::from_secs(60),
            job_deadline: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            registry_write_attempts: 5,
        }
    }
}

impl OrchestratorConfig {
    /// Tight timings for tests.
    pub fn fast() -> Self {
        OrchestratorConfig {
            poll_interval: Duration::from_millis(10),
            step_timeout: Duration::from_millis(500),
            job_deadline: Duration::from_secs(10),
            retry: RetryPolicy::fast(5),
            ..OrchestratorConfig::default()
        }
    }
}

/// Everything a running job needs; cloned into each job's task.
#[derive(Clone)]
struct JobRunner {
    store: Arc<dyn TenantStore>,
    backend: Arc<dyn ProvisioningBackend>,
    jobs: Arc<JobStore>,
    sink: Arc<dyn NotificationSink>,
    quota: Option<Arc<QuotaEnforcer>>,
    config: OrchestratorConfig,
}

pub struct ProvisioningOrchestrator {
    runner: JobRunner,
    shutdown_token: CancellationToken,
}

impl ProvisioningOrchestrator {
    pub fn new(store: Arc<dyn TenantStore>, backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self::with_config(store, backend, OrchestratorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn TenantStore>,
        backend: Arc<dyn ProvisioningBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        ProvisioningOrchestrator {
            runner: JobRunner {
                store,
                backend,
                jobs: Arc::new(JobStore::new()),
                sink: Arc::new(TracingSink),
                quota: None,
                config,
            },
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Replaces the notification sink.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.runner.sink = sink;
        self
    }

    /// Wires a quota enforcer so the pool model's counter-namespace step
    /// takes local effect. Only meaningful when the enforcer lives in the
    /// same process.
    pub fn with_quota(mut self, quota: Arc<QuotaEnforcer>) -> Self {
        self.runner.quota = Some(quota);
        self
    }

    /// Shares a job store, e.g. one reloaded from a previous process.
    pub fn with_job_store(mut self, jobs: Arc<JobStore>) -> Self {
        self.runner.jobs = jobs;
        self
    }

    /// Used to signal graceful shutdown from external handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn job_store(&self) -> Arc<JobStore> {
        self.runner.jobs.clone()
    }

    /// Runs the worker loop until shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(backend = %self.runner.backend.name(), "provisioning orchestrator starting");

        // Pick up jobs stranded by a previous process first.
        self.recover().await;

        let mut active: HashMap<Uuid, tokio::task::JoinHandle<()>> = HashMap::new();

        loop {
            if self.shutdown_token.is_cancelled() {
                tracing::info!(
                    jobs = active.len(),
                    "shutdown requested, waiting for in-flight jobs"
                );
                futures::future::join_all(active.drain().map(|(_, handle)| handle)).await;
                tracing::info!("provisioning orchestrator shut down");
                break;
            }

            active.retain(|_, handle| !handle.is_finished());

            let slots = self
                .runner
                .config
                .max_concurrent_jobs
                .saturating_sub(active.len());
            if slots == 0 {
                sleep(Duration::from_millis(100)).await;
                continue;
            }

            let claimed = match self.claim_batch(slots).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    tracing::error!(error = %err, "failed to poll for requested tenants");
                    self.idle().await;
                    continue;
                }
            };

            if claimed.is_empty() {
                self.idle().await;
                continue;
            }

            for tenant_id in claimed {
                let runner = self.runner.clone();
                active.insert(
                    tenant_id,
                    tokio::spawn(async move {
                        runner.execute(tenant_id).await;
                    }),
                );
            }
        }

        Ok(())
    }

    /// One synchronous orchestration cycle: claims up to a batch of
    /// requested tenants and drives each job to completion. Returns the
    /// number of jobs executed. Test and demo entry point.
    pub async fn run_once(&self) -> EngineResult<usize> {
        let claimed = self.claim_batch(self.runner.config.claim_batch_size).await?;
        let count = claimed.len();
        for tenant_id in claimed {
            self.runner.execute(tenant_id).await;
        }
        Ok(count)
    }

    /// Drives the stored (or reconstructed) job for one `provisioning`
    /// tenant to completion. The resumption entry point.
    pub async fn resume(&self, tenant_id: Uuid) -> EngineResult<()> {
        let tenant = self.runner.store.get(tenant_id).await?;
        if tenant.status != TenantStatus::Provisioning {
            return Err(EngineError::TenantNotActive {
                tenant_id,
                status: tenant.status,
            });
        }
        self.runner.execute(tenant_id).await;
        Ok(())
    }

    async fn recover(&self) {
        let stranded = match self
            .runner
            .store
            .list_by_status(TenantStatus::Provisioning, self.runner.config.claim_batch_size)
            .await
        {
            Ok(stranded) => stranded,
            Err(err) => {
                tracing::error!(error = %err, "failed to list stranded provisioning tenants");
                return;
            }
        };

        for tenant in stranded {
            tracing::info!(tenant_id = %tenant.tenant_id, "resuming stranded provisioning job");
            let runner = self.runner.clone();
            tokio::spawn(async move {
                runner.execute(tenant.tenant_id).await;
            });
        }
    }

    /// Claims up to `slots` requested tenants by transitioning them to
    /// `provisioning`. A version conflict means another orchestrator got
    /// there first; the tenant is skipped, not an error.
    async fn claim_batch(&self, slots: usize) -> EngineResult<Vec<Uuid>> {
        let batch = slots.min(self.runner.config.claim_batch_size);
        let requested = self
            .runner
            .store
            .list_by_status(TenantStatus::Requested, batch)
            .await?;

        let mut claimed = Vec::new();
        for tenant in requested {
            match self.runner.claim(&tenant).await {
                Ok(()) => claimed.push(tenant.tenant_id),
                Err(err) if err.is_retryable() => {
                    tracing::debug!(tenant_id = %tenant.tenant_id, "tenant claimed elsewhere");
                }
                Err(err) => {
                    tracing::error!(tenant_id = %tenant.tenant_id, error = %err, "claim failed");
                }
            }
        }
        Ok(claimed)
    }

    async fn idle(&self) {
        tokio::select! {
            _ = sleep(self.runner.config.poll_interval) => {}
            _ = self.shutdown_token.cancelled() => {}
        }
    }
}

impl JobRunner {
    /// Claims one requested tenant: status to `provisioning`, binding
    /// initialized, job recorded.
    async fn claim(&self, tenant: &Tenant) -> EngineResult<()> {
        let model = tenant.isolation_model;
        self.store
            .update(tenant.tenant_id, tenant.version, &move |t| {
                t.status = TenantStatus::Provisioning;
                t.resource_binding = Some(ResourceBinding::initial(model));
            })
            .await?;

        let deadline = Utc::now()
            + chrono::Duration::from_std(self.config.job_deadline)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
        self.jobs
            .put(ProvisioningJob::new(tenant.tenant_id, model, deadline));

        self.sink
            .notify(LifecycleEvent::now(
                tenant.tenant_id,
                TenantStatus::Requested,
                TenantStatus::Provisioning,
            ))
            .await;

        tracing::info!(
            tenant_id = %tenant.tenant_id,
            isolation_model = %model,
            "claimed tenant for provisioning"
        );
        Ok(())
    }

    /// Top-level job entry; logs instead of propagating so one tenant's
    /// failure never takes down the loop.
    async fn execute(&self, tenant_id: Uuid) {
        if let Err(err) = self.drive(tenant_id).await {
            tracing::error!(
                tenant_id = %tenant_id,
                error = %err,
                "provisioning job aborted without reaching a terminal status"
            );
        }
    }

    async fn drive(&self, tenant_id: Uuid) -> EngineResult<()> {
        let mut job = match self.jobs.get(tenant_id) {
            Some(job) => job,
            None => {
                // No stored cursor (fresh process). Steps are idempotent,
                // so restarting the sequence converges.
                let tenant = self.store.get(tenant_id).await?;
                let deadline = Utc::now()
                    + chrono::Duration::from_std(self.config.job_deadline)
                        .unwrap_or_else(|_| chrono::Duration::minutes(30));
                let job = ProvisioningJob::new(tenant_id, tenant.isolation_model, deadline);
                self.jobs.put(job.clone());
                job
            }
        };

        while let Some(step) = job.current_step() {
            if job.deadline_exceeded(Utc::now()) {
                self.fail(
                    &mut job,
                    step,
                    "provisioning deadline exceeded".to_string(),
                )
                .await?;
                return Ok(());
            }

            let tenant = self.store.get(tenant_id).await?;
            let request = StepRequest::new(step, tenant_id, step.params(&tenant));

            tracing::debug!(
                tenant_id = %tenant_id,
                step = %step,
                attempt = job.attempts_on_current + 1,
                "executing provisioning step"
            );

            let outcome = match tokio::time::timeout(
                self.config.step_timeout,
                self.backend.execute_step(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => StepOutcome::retryable(format!(
                    "step {} exceeded its {:?} deadline",
                    step, self.config.step_timeout
                )),
            };

            match outcome {
                StepOutcome::Success { outputs } => {
                    self.persist_step(&tenant, step, &outputs).await?;
                    job.advance();
                    self.jobs.save(&job);
                    tracing::info!(
                        tenant_id = %tenant_id,
                        step = %step,
                        completed = job.cursor,
                        total = job.steps.len(),
                        "provisioning step completed"
                    );
                }
                StepOutcome::Retryable { message } => {
                    job.record_attempt(&message);
                    self.jobs.save(&job);

                    if !self.config.retry.allows_retry(job.attempts_on_current) {
                        let attempts_on_current = job.attempts_on_current;
                        self.fail(
                            &mut job,
                            step,
                            format!(
                                "retry budget exhausted after {attempts_on_current} attempts: {message}"
                            ),
                        )
                        .await?;
                        return Ok(());
                    }

                    let delay = self.config.retry.delay_for(job.attempts_on_current - 1);
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        step = %step,
                        attempt = job.attempts_on_current,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "provisioning step failed, backing off"
                    );
                    sleep(delay).await;
                }
                StepOutcome::Fatal { message } => {
                    self.fail(&mut job, step, message).await?;
                    return Ok(());
                }
            }
        }

        self.complete(&job).await
    }

    /// Persists a completed step's effects before the cursor moves.
    async fn persist_step(
        &self,
        tenant: &Tenant,
        step: ProvisionStep,
        outputs: &serde_json::Value,
    ) -> EngineResult<()> {
        let model = tenant.isolation_model;
        update_with_retry(
            &self.store,
            tenant.tenant_id,
            self.config.registry_write_attempts,
            &|t| {
                let mut binding = t
                    .resource_binding
                    .clone()
                    .unwrap_or_else(|| ResourceBinding::initial(model));
                step.apply_outputs(&mut binding, outputs);
                t.resource_binding = Some(binding);
            },
        )
        .await?;

        if step == ProvisionStep::AllocateCounterNamespace {
            if let Some(quota) = &self.quota {
                quota.allocate_namespace(tenant.tenant_id);
            }
        }

        Ok(())
    }

    async fn complete(&self, job: &ProvisioningJob) -> EngineResult<()> {
        update_with_retry(
            &self.store,
            job.tenant_id,
            self.config.registry_write_attempts,
            &|t| {
                t.status = TenantStatus::Active;
                t.last_failure = None;
            },
        )
        .await?;

        self.jobs.archive(job.tenant_id);
        self.sink
            .notify(LifecycleEvent::now(
                job.tenant_id,
                TenantStatus::Provisioning,
                TenantStatus::Active,
            ))
            .await;

        tracing::info!(tenant_id = %job.tenant_id, "tenant provisioning complete");
        Ok(())
    }

    /// Terminal failure path. Completed steps stay in place; cleanup of
    /// partially provisioned infrastructure is an operator decision, not
    /// an automatic rollback.
    async fn fail(
        &self,
        job: &mut ProvisioningJob,
        step: ProvisionStep,
        message: String,
    ) -> EngineResult<()> {
        job.last_error = Some(message.clone());
        self.jobs.save(job);

        let failure = StepFailure {
            step: step.as_str().to_string(),
            message: message.clone(),
        };
        update_with_retry(
            &self.store,
            job.tenant_id,
            self.config.registry_write_attempts,
            &move |t| {
                t.status = TenantStatus::Failed;
                t.last_failure = Some(failure.clone());
            },
        )
        .await?;

        self.jobs.archive(job.tenant_id);
        self.sink
            .notify(LifecycleEvent::now(
                job.tenant_id,
                TenantStatus::Provisioning,
                TenantStatus::Failed,
            ))
            .await;

        tracing::error!(
            tenant_id = %job.tenant_id,
            step = %step,
            error = %message,
            "tenant provisioning failed"
        );
        Ok(())
    }
}
