/// Job store
///
/// One `ProvisioningJob` record per in-flight lifecycle transition, keyed
/// by tenant id. The orchestrator persists the cursor here after every
/// completed step so a restarted process resumes at the last completed
/// step instead of re-executing finished work.
///
/// Terminal jobs are archived rather than destroyed, which keeps the step
/// trail inspectable (tests and operators both use it).

use dashmap::DashMap;
use strata_shared::models::job::ProvisioningJob;
use uuid::Uuid;

#[derive(Default)]
pub struct JobStore {
    active: DashMap<Uuid, ProvisioningJob>,
    archived: DashMap<Uuid, ProvisioningJob>,
}

impl JobStore {
    pub fn new() -> Self {
        JobStore::default()
    }

    /// Records a new or resumed job. Overwrites any previous in-flight
    /// record for the tenant — there is at most one transition in flight.
    pub fn put(&self, job: ProvisioningJob) {
        self.active.insert(job.tenant_id, job);
    }

    pub fn get(&self, tenant_id: Uuid) -> Option<ProvisioningJob> {
        self.active.get(&tenant_id).map(|j| j.clone())
    }

    /// Persists updated job state (cursor, attempts, last error).
    pub fn save(&self, job: &ProvisioningJob) {
        self.active.insert(job.tenant_id, job.clone());
    }

    /// Moves a finished job out of the active set, keeping the archive
    /// copy.
    pub fn archive(&self, tenant_id: Uuid) {
        if let Some((_, job)) = self.active.remove(&tenant_id) {
            self.archived.insert(tenant_id, job);
        }
    }

    pub fn archived(&self, tenant_id: Uuid) -> Option<ProvisioningJob> {
        self.archived.get(&tenant_id).map(|j| j.clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
