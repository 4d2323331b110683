/// Lifecycle events and notification sinks
///
/// Every tenant status transition emits a `LifecycleEvent` to a
/// `NotificationSink`. Sinks are fire-and-forget from the engine's point
/// of view: a failing sink is logged, never allowed to fail the transition
/// that produced the event.

use crate::models::tenant::TenantStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One tenant status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub tenant_id: Uuid,
    pub from_status: TenantStatus,
    pub to_status: TenantStatus,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn now(tenant_id: Uuid, from_status: TenantStatus, to_status: TenantStatus) -> Self {
        LifecycleEvent {
            tenant_id,
            from_status,
            to_status,
            timestamp: Utc::now(),
        }
    }
}

/// Delivery target for lifecycle events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: LifecycleEvent);
}

/// Emits events as structured log lines. The default sink.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: LifecycleEvent) {
        tracing::info!(
            tenant_id = %event.tenant_id,
            from = %event.from_status,
            to = %event.to_status,
            "tenant lifecycle transition"
        );
    }
}

/// Forwards events over an unbounded channel. Used by tests to assert on
/// the exact transition sequence.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, event: LifecycleEvent) {
        // Receiver dropped means nobody is listening; that's fine.
        let _ = self.tx.send(event);
    }
}

/// Posts events to an external webhook endpoint as JSON.
pub struct WebhookSink {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookSink {
    pub fn new(endpoint: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(WebhookSink {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: LifecycleEvent) {
        let result = self
            .client
            .post(&self.endpoint)
            .json(&event)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        if let Err(err) = result {
            tracing::warn!(
                tenant_id = %event.tenant_id,
                endpoint = %self.endpoint,
                error = %err,
                "webhook notification delivery failed"
            );
        }
    }
}
