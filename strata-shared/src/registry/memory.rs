/// In-memory tenant store
///
/// `DashMap`-backed implementation used by tests and single-process
/// wiring. Per-record atomicity comes from holding the map entry's write
/// guard across the read-mutate-commit of `update`; `create` serializes
/// behind a mutex so two concurrent onboardings with the same admin email
/// cannot both pass the duplicate check.

use crate::error::{EngineError, EngineResult};
use crate::models::tenant::{Tenant, TenantDraft, TenantStatus};
use crate::registry::{apply_update, Mutator, TenantStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, Tenant>,
    create_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of records, deleted included. Test helper.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn create(&self, draft: TenantDraft) -> EngineResult<Tenant> {
        let _guard = self.create_lock.lock();

        let duplicate = self
            .records
            .iter()
            .any(|r| r.is_live() && r.admin_email.eq_ignore_ascii_case(&draft.admin_email));
        if duplicate {
            return Err(EngineError::DuplicateTenant {
                admin_email: draft.admin_email,
            });
        }

        let tenant = Tenant::from_draft(draft);
        self.records.insert(tenant.tenant_id, tenant.clone());
        Ok(tenant)
    }

    async fn get(&self, tenant_id: Uuid) -> EngineResult<Tenant> {
        self.records
            .get(&tenant_id)
            .map(|r| r.clone())
            .ok_or(EngineError::NotFound(tenant_id))
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        expected_version: u64,
        mutator: Mutator<'_>,
    ) -> EngineResult<Tenant> {
        let mut entry = self
            .records
            .get_mut(&tenant_id)
            .ok_or(EngineError::NotFound(tenant_id))?;

        let next = apply_update(&entry, expected_version, mutator)?;
        *entry = next.clone();
        Ok(next)
    }

    async fn mark_deleted(&self, tenant_id: Uuid) -> EngineResult<Tenant> {
        let mut entry = self
            .records
            .get_mut(&tenant_id)
            .ok_or(EngineError::NotFound(tenant_id))?;

        let version = entry.version;
        let next = apply_update(&entry, version, &|t| {
            t.status = TenantStatus::Deleted;
            t.deleted_at = Some(Utc::now());
        })?;
        *entry = next.clone();
        Ok(next)
    }

    async fn find_by_admin_email(&self, email: &str) -> EngineResult<Option<Tenant>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.is_live() && r.admin_email.eq_ignore_ascii_case(email))
            .map(|r| r.clone()))
    }

    async fn list_by_status(
        &self,
        status: TenantStatus,
        limit: usize,
    ) -> EngineResult<Vec<Tenant>> {
        let mut matches: Vec<Tenant> = self
            .records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect();
        matches.sort_by_key(|t| t.created_at);
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::{IsolationModel, TenantTier};
    use std::sync::Arc;

    fn draft(email: &str) -> TenantDraft {
        TenantDraft {
            company_name: "Acme Corp".to_string(),
            admin_email: email.to_string(),
            tier: TenantTier::Basic,
            isolation_model: IsolationModel::Pool,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let tenant = store.create(draft("a@acme.test")).await.unwrap();

        let fetched = store.get(tenant.tenant_id).await.unwrap();
        assert_eq!(fetched.tenant_id, tenant.tenant_id);
        assert_eq!(fetched.status, TenantStatus::Requested);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_admin_rejected_until_deleted() {
        let store = MemoryStore::new();
        let first = store.create(draft("a@acme.test")).await.unwrap();

        let err = store.create(draft("A@ACME.TEST")).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTenant { .. }));

        // Soft-deleting the first tenant frees the admin identity. The
        // requested tenant has to move through the machine to a deletable
        // status first.
        let t = store
            .update(first.tenant_id, first.version, &|t| {
                t.status = TenantStatus::Provisioning;
            })
            .await
            .unwrap();
        let t = store
            .update(first.tenant_id, t.version, &|t| {
                t.status = TenantStatus::Failed;
            })
            .await
            .unwrap();
        store.mark_deleted(t.tenant_id).await.unwrap();

        assert!(store.create(draft("a@acme.test")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_version_conflict() {
        let store = MemoryStore::new();
        let tenant = store.create(draft("a@acme.test")).await.unwrap();

        // First writer wins.
        store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.company_name = "First".to_string();
            })
            .await
            .unwrap();

        // Second writer raced on the same snapshot and loses.
        let err = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.company_name = "Second".to_string();
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VersionConflict { .. }));

        let current = store.get(tenant.tenant_id).await.unwrap();
        assert_eq!(current.company_name, "First");
    }

    #[tokio::test]
    async fn test_concurrent_updates_exactly_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let tenant = store.create(draft("a@acme.test")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = tenant.tenant_id;
            let version = tenant.version;
            handles.push(tokio::spawn(async move {
                store
                    .update(id, version, &move |t| {
                        t.company_name = format!("writer-{i}");
                    })
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_mark_deleted_is_soft() {
        let store = MemoryStore::new();
        let tenant = store.create(draft("a@acme.test")).await.unwrap();
        let t = store
            .update(tenant.tenant_id, tenant.version, &|t| {
                t.status = TenantStatus::Provisioning;
            })
            .await
            .unwrap();
        let t = store
            .update(tenant.tenant_id, t.version, &|t| {
                t.status = TenantStatus::Active;
            })
            .await
            .unwrap();

        let deleted = store.mark_deleted(t.tenant_id).await.unwrap();
        assert_eq!(deleted.status, TenantStatus::Deleted);
        assert!(deleted.deleted_at.is_some());

        // Record survives for audit.
        assert!(store.get(tenant.tenant_id).await.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_requested_tenant_rejected() {
        let store = MemoryStore::new();
        let tenant = store.create(draft("a@acme.test")).await.unwrap();
        let err = store.mark_deleted(tenant.tenant_id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_list_by_status_oldest_first() {
        let store = MemoryStore::new();
        let a = store.create(draft("a@acme.test")).await.unwrap();
        let b = store.create(draft("b@acme.test")).await.unwrap();

        let requested = store
            .list_by_status(TenantStatus::Requested, 10)
            .await
            .unwrap();
        assert_eq!(requested.len(), 2);
        assert!(requested[0].created_at <= requested[1].created_at);

        store
            .update(a.tenant_id, a.version, &|t| {
                t.status = TenantStatus::Provisioning;
            })
            .await
            .unwrap();

        let requested = store
            .list_by_status(TenantStatus::Requested, 10)
            .await
            .unwrap();
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[0].tenant_id, b.tenant_id);
    }
}
