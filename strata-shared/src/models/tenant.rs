/// Tenant model and lifecycle state machine
///
/// A tenant is a customer organization whose data and usage are isolated
/// from every other tenant. Each record carries the commercial tier (which
/// drives quota limits and feature flags), the isolation model (which
/// drives routing and provisioning), the lifecycle status, and the
/// progressively populated resource binding.
///
/// # Lifecycle
///
/// ```text
/// requested -> provisioning -> active <-> suspended
///                    |            \         |
///                    v             v        v
///                  failed  ----> deleted (terminal)
/// ```
///
/// There is no shortcut from `requested` to `active`: every tenant passes
/// through `provisioning` regardless of isolation model. `deleted` is a
/// soft-delete marker; records are never physically removed, preserving
/// audit history.
///
/// # Ownership
///
/// Tenant records are exclusively owned by the registry (`TenantStore`).
/// All reads return owned snapshots; mutation goes through the registry's
/// optimistic-concurrency `update` and nothing else.

use crate::error::{EngineError, EngineResult};
use crate::models::binding::ResourceBinding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Commercial plan tier
///
/// Controls quota limits and feature flags, independent of isolation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantTier {
    Basic,
    Premium,
    Enterprise,
}

impl TenantTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantTier::Basic => "basic",
            TenantTier::Premium => "premium",
            TenantTier::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(TenantTier::Basic),
            "premium" => Some(TenantTier::Premium),
            "enterprise" => Some(TenantTier::Enterprise),
            _ => None,
        }
    }
}

impl Default for TenantTier {
    fn default() -> Self {
        TenantTier::Basic
    }
}

impl fmt::Display for TenantTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength of resource separation for a tenant
///
/// - **Pool**: shared everything; access scoped by tenant-id filtering.
/// - **Bridge**: shared compute, isolated schema/namespace.
/// - **Silo**: fully dedicated infrastructure.
///
/// Immutable once provisioning begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationModel {
    Pool,
    Bridge,
    Silo,
}

impl IsolationModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationModel::Pool => "pool",
            IsolationModel::Bridge => "bridge",
            IsolationModel::Silo => "silo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pool" => Some(IsolationModel::Pool),
            "bridge" => Some(IsolationModel::Bridge),
            "silo" => Some(IsolationModel::Silo),
            _ => None,
        }
    }
}

impl Default for IsolationModel {
    fn default() -> Self {
        IsolationModel::Pool
    }
}

impl fmt::Display for IsolationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Requested,
    Provisioning,
    Active,
    Suspended,
    Failed,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Requested => "requested",
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Failed => "failed",
            TenantStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(TenantStatus::Requested),
            "provisioning" => Some(TenantStatus::Provisioning),
            "active" => Some(TenantStatus::Active),
            "suspended" => Some(TenantStatus::Suspended),
            "failed" => Some(TenantStatus::Failed),
            "deleted" => Some(TenantStatus::Deleted),
            _ => None,
        }
    }

    /// Whether the lifecycle state machine permits `self -> to`.
    ///
    /// The set of transitions is closed and checked exhaustively; every
    /// status mutation through the registry runs through this.
    pub fn can_transition(&self, to: TenantStatus) -> bool {
        use TenantStatus::*;
        match (*self, to) {
            (Requested, Provisioning) => true,
            (Provisioning, Active) | (Provisioning, Failed) => true,
            (Active, Suspended) | (Suspended, Active) => true,
            (Active, Deleted) | (Suspended, Deleted) | (Failed, Deleted) => true,
            _ => false,
        }
    }

    pub fn validate_transition(&self, to: TenantStatus) -> EngineResult<()> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { from: *self, to })
        }
    }

    /// `deleted` is the only terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TenantStatus::Deleted)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kinds governed by per-tenant quota ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Products,
    Orders,
    Users,
    ApiCalls,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Products,
        ResourceKind::Orders,
        ResourceKind::Users,
        ResourceKind::ApiCalls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Products => "products",
            ResourceKind::Orders => "orders",
            ResourceKind::Users => "users",
            ResourceKind::ApiCalls => "api_calls",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "products" => Some(ResourceKind::Products),
            "orders" => Some(ResourceKind::Orders),
            "users" => Some(ResourceKind::Users),
            "api_calls" => Some(ResourceKind::ApiCalls),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel for an uncapped resource kind.
pub const UNLIMITED: i64 = -1;

/// Per-tier resource ceilings
///
/// # Limits by tier
///
/// | tier       | products | orders | users | api calls/hour |
/// |------------|----------|--------|-------|----------------|
/// | basic      | 100      | 1,000  | 10    | 1,000          |
/// | premium    | 1,000    | 10,000 | 50    | 10,000         |
/// | enterprise | ∞        | ∞      | ∞     | 100,000        |
///
/// `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_products: i64,
    pub max_orders: i64,
    pub max_users: i64,
    pub max_api_calls_per_hour: i64,
}

impl TierLimits {
    pub fn for_tier(tier: TenantTier) -> Self {
        match tier {
            TenantTier::Basic => TierLimits {
                max_products: 100,
                max_orders: 1_000,
                max_users: 10,
                max_api_calls_per_hour: 1_000,
            },
            TenantTier::Premium => TierLimits {
                max_products: 1_000,
                max_orders: 10_000,
                max_users: 50,
                max_api_calls_per_hour: 10_000,
            },
            TenantTier::Enterprise => TierLimits {
                max_products: UNLIMITED,
                max_orders: UNLIMITED,
                max_users: UNLIMITED,
                max_api_calls_per_hour: 100_000,
            },
        }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Products => self.max_products,
            ResourceKind::Orders => self.max_orders,
            ResourceKind::Users => self.max_users,
            ResourceKind::ApiCalls => self.max_api_calls_per_hour,
        }
    }
}

/// Feature flags available at a given tier.
pub fn features_for_tier(tier: TenantTier) -> BTreeMap<String, bool> {
    let mut features = BTreeMap::new();
    let enabled = |f: &mut BTreeMap<String, bool>, name: &str, on: bool| {
        f.insert(name.to_string(), on);
    };

    match tier {
        TenantTier::Basic => {
            enabled(&mut features, "advanced_analytics", false);
            enabled(&mut features, "custom_branding", false);
            enabled(&mut features, "api_access", true);
            enabled(&mut features, "priority_support", false);
            enabled(&mut features, "data_export", false);
        }
        TenantTier::Premium => {
            enabled(&mut features, "advanced_analytics", true);
            enabled(&mut features, "custom_branding", true);
            enabled(&mut features, "api_access", true);
            enabled(&mut features, "priority_support", true);
            enabled(&mut features, "data_export", true);
        }
        TenantTier::Enterprise => {
            enabled(&mut features, "advanced_analytics", true);
            enabled(&mut features, "custom_branding", true);
            enabled(&mut features, "api_access", true);
            enabled(&mut features, "priority_support", true);
            enabled(&mut features, "data_export", true);
            enabled(&mut features, "dedicated_support", true);
            enabled(&mut features, "custom_integrations", true);
        }
    }

    features
}

/// Step name + message recorded when provisioning fails.
///
/// Denormalized onto the tenant record so the status interface can report
/// `failed_step` without reaching into the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

/// Tenant record
///
/// The registry is the single writer; everything else gets snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Opaque unique identifier, immutable
    pub tenant_id: Uuid,

    /// Organization name from the onboarding request
    pub company_name: String,

    /// Admin identity; drives the duplicate-tenant check
    pub admin_email: String,

    /// Commercial tier
    pub tier: TenantTier,

    /// Isolation model; immutable once provisioning begins
    pub isolation_model: IsolationModel,

    /// Lifecycle status
    pub status: TenantStatus,

    /// Per-resource-kind ceilings, recomputed on tier change
    pub limits: TierLimits,

    /// Tier feature flags
    pub features: BTreeMap<String, bool>,

    /// Isolation-model-specific binding, populated during provisioning
    pub resource_binding: Option<ResourceBinding>,

    /// Last provisioning failure, if any
    pub last_failure: Option<StepFailure>,

    /// Optimistic-concurrency version, incremented on every update
    pub version: u64,

    pub created_at: DateTime<Utc>,

    /// Monotonic non-decreasing
    pub updated_at: DateTime<Utc>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Builds a fresh `requested` record from an onboarding draft.
    pub fn from_draft(draft: TenantDraft) -> Self {
        let now = Utc::now();
        Tenant {
            tenant_id: Uuid::new_v4(),
            company_name: draft.company_name,
            admin_email: draft.admin_email,
            tier: draft.tier,
            isolation_model: draft.isolation_model,
            status: TenantStatus::Requested,
            limits: TierLimits::for_tier(draft.tier),
            features: features_for_tier(draft.tier),
            resource_binding: None,
            last_failure: None,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Ceiling for one resource kind (`-1` = unlimited).
    pub fn limit_for(&self, kind: ResourceKind) -> i64 {
        self.limits.get(kind)
    }

    /// Applies a tier change, recomputing limits and features.
    ///
    /// Tier changes affect future quota checks only; existing usage is
    /// never retroactively invalidated.
    pub fn change_tier(&mut self, tier: TenantTier) {
        self.tier = tier;
        self.limits = TierLimits::for_tier(tier);
        self.features = features_for_tier(tier);
    }

    pub fn is_live(&self) -> bool {
        self.status != TenantStatus::Deleted
    }
}

/// Input for creating a new tenant (the onboarding request payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDraft {
    pub company_name: String,
    pub admin_email: String,

    #[serde(default)]
    pub tier: TenantTier,

    #[serde(default)]
    pub isolation_model: IsolationModel,
}
