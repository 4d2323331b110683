/// Postgres tenant store
///
/// Durable `TenantStore` implementation. Optimistic concurrency is
/// enforced in SQL: the `UPDATE` carries `WHERE version = $expected`, so a
/// racing writer's commit makes the loser's statement affect zero rows,
/// which is reported as `VersionConflict`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     tenant_id UUID PRIMARY KEY,
///     company_name VARCHAR(255) NOT NULL,
///     admin_email VARCHAR(255) NOT NULL,
///     tier VARCHAR(50) NOT NULL,
///     isolation_model VARCHAR(50) NOT NULL,
///     status VARCHAR(50) NOT NULL,
///     limits JSONB NOT NULL,
///     features JSONB NOT NULL,
///     resource_binding JSONB,
///     last_failure JSONB,
///     version BIGINT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     deleted_at TIMESTAMPTZ
/// );
///
/// -- One live tenant per admin identity.
/// CREATE UNIQUE INDEX tenants_live_admin_email
///     ON tenants (LOWER(admin_email))
///     WHERE status <> 'deleted';
/// ```

use crate::error::{EngineError, EngineResult};
use crate::models::binding::ResourceBinding;
use crate::models::tenant::{
    IsolationModel, StepFailure, Tenant, TenantDraft, TenantStatus, TenantTier, TierLimits,
};
use crate::registry::{apply_update, Mutator, TenantStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

const TENANT_COLUMNS: &str = "tenant_id, company_name, admin_email, tier, isolation_model, \
     status, limits, features, resource_binding, last_failure, version, \
     created_at, updated_at, deleted_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    async fn fetch(&self, tenant_id: Uuid) -> EngineResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE tenant_id = $1"
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Tenant::try_from).transpose()
    }

    async fn commit(&self, next: &Tenant, expected_version: u64) -> EngineResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET company_name = $3, admin_email = $4, tier = $5,
                isolation_model = $6, status = $7, limits = $8, features = $9,
                resource_binding = $10, last_failure = $11, version = $12,
                updated_at = $13, deleted_at = $14
            WHERE tenant_id = $1 AND version = $2
            "#,
        )
        .bind(next.tenant_id)
        .bind(expected_version as i64)
        .bind(&next.company_name)
        .bind(&next.admin_email)
        .bind(next.tier.as_str())
        .bind(next.isolation_model.as_str())
        .bind(next.status.as_str())
        .bind(serde_json::to_value(next.limits).map_err(|e| EngineError::Store(e.to_string()))?)
        .bind(
            serde_json::to_value(&next.features)
                .map_err(|e| EngineError::Store(e.to_string()))?,
        )
        .bind(
            next.resource_binding
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| EngineError::Store(e.to_string()))?,
        )
        .bind(
            next.last_failure
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| EngineError::Store(e.to_string()))?,
        )
        .bind(next.version as i64)
        .bind(next.updated_at)
        .bind(next.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn create(&self, draft: TenantDraft) -> EngineResult<Tenant> {
        let tenant = Tenant::from_draft(draft);

        let result = sqlx::query(&format!(
            "INSERT INTO tenants ({TENANT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(tenant.tenant_id)
        .bind(&tenant.company_name)
        .bind(&tenant.admin_email)
        .bind(tenant.tier.as_str())
        .bind(tenant.isolation_model.as_str())
        .bind(tenant.status.as_str())
        .bind(serde_json::to_value(tenant.limits).map_err(|e| EngineError::Store(e.to_string()))?)
        .bind(
            serde_json::to_value(&tenant.features)
                .map_err(|e| EngineError::Store(e.to_string()))?,
        )
        .bind(None::<serde_json::Value>)
        .bind(None::<serde_json::Value>)
        .bind(tenant.version as i64)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .bind(tenant.deleted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(tenant),
            Err(sqlx::Error::Database(db_err))
                if db_err
                    .constraint()
                    .is_some_and(|c| c.contains("admin_email")) =>
            {
                Err(EngineError::DuplicateTenant {
                    admin_email: tenant.admin_email,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, tenant_id: Uuid) -> EngineResult<Tenant> {
        self.fetch(tenant_id)
            .await?
            .ok_or(EngineError::NotFound(tenant_id))
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        expected_version: u64,
        mutator: Mutator<'_>,
    ) -> EngineResult<Tenant> {
        let current = self.get(tenant_id).await?;
        let next = apply_update(&current, expected_version, mutator)?;

        if self.commit(&next, expected_version).await? == 0 {
            // Lost the race between our read and our write; report the
            // version the winner left behind.
            let actual = self.get(tenant_id).await?.version;
            return Err(EngineError::VersionConflict {
                tenant_id,
                expected: expected_version,
                actual,
            });
        }

        Ok(next)
    }

    async fn mark_deleted(&self, tenant_id: Uuid) -> EngineResult<Tenant> {
        let current = self.get(tenant_id).await?;
        self.update(tenant_id, current.version, &|t| {
            t.status = TenantStatus::Deleted;
            t.deleted_at = Some(Utc::now());
        })
        .await
    }

    async fn find_by_admin_email(&self, email: &str) -> EngineResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE LOWER(admin_email) = LOWER($1) AND status <> 'deleted'"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Tenant::try_from).transpose()
    }

    async fn list_by_status(
        &self,
        status: TenantStatus,
        limit: usize,
    ) -> EngineResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE status = $1 ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Tenant::try_from).collect()
    }
}

/// Raw row shape; enum and JSONB columns convert in `TryFrom`.
#[derive(sqlx::FromRow)]
struct TenantRow {
    tenant_id: Uuid,
    company_name: String,
    admin_email: String,
    tier: String,
    isolation_model: String,
    status: String,
    limits: serde_json::Value,
    features: serde_json::Value,
    resource_binding: Option<serde_json::Value>,
    last_failure: Option<serde_json::Value>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = EngineError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| EngineError::Store(format!("corrupt column: {field}"));

        let tier = TenantTier::parse(&row.tier).ok_or_else(|| corrupt("tier"))?;
        let isolation_model = IsolationModel::parse(&row.isolation_model)
            .ok_or_else(|| corrupt("isolation_model"))?;
        let status = TenantStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?;

        let limits: TierLimits =
            serde_json::from_value(row.limits).map_err(|_| corrupt("limits"))?;
        let features: BTreeMap<String, bool> =
            serde_json::from_value(row.features).map_err(|_| corrupt("features"))?;
        let resource_binding: Option<ResourceBinding> = row
            .resource_binding
            .map(serde_json::from_value)
            .transpose()
            .map_err(|_| corrupt("resource_binding"))?;
        let last_failure: Option<StepFailure> = row
            .last_failure
            .map(serde_json::from_value)
            .transpose()
            .map_err(|_| corrupt("last_failure"))?;

        Ok(Tenant {
            tenant_id: row.tenant_id,
            company_name: row.company_name,
            admin_email: row.admin_email,
            tier,
            isolation_model,
            status,
            limits,
            features,
            resource_binding,
            last_failure,
            version: row.version as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
