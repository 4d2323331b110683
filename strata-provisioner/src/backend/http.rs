/// HTTP provisioning backend
///
/// Forwards step execution to an external provisioning service (the thing
/// that actually runs infrastructure-as-code for bridge/silo resources).
/// The service receives the full `StepRequest` as JSON at
/// `POST {base_url}/steps/{step_name}` and replies with the step outputs.
///
/// Outcome mapping:
///
/// - 2xx → `Success` with the response body as outputs
/// - 4xx → `Fatal` (the request itself is wrong; retrying cannot help)
/// - 5xx, connect errors, timeouts → `Retryable`
///
/// Idempotency is the service's side of the contract: it must treat a
/// repeated `(step, tenant_id)` as a no-op converging on the same result.

use crate::backend::{ProvisioningBackend, StepOutcome, StepRequest};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(HttpBackend {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn step_url(&self, req: &StepRequest) -> String {
        format!("{}/steps/{}", self.base_url, req.step)
    }
}

/// Maps an HTTP status to a step outcome. Split out so the mapping is
/// testable without a live service.
pub(crate) fn outcome_for_status(status: StatusCode, body: serde_json::Value) -> StepOutcome {
    if status.is_success() {
        StepOutcome::success(body)
    } else if status.is_client_error() {
        StepOutcome::fatal(format!("provisioning service rejected step: {status}"))
    } else {
        StepOutcome::retryable(format!("provisioning service error: {status}"))
    }
}

#[async_trait]
impl ProvisioningBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute_step(&self, req: StepRequest) -> StepOutcome {
        let url = self.step_url(&req);

        let response = match self.client.post(&url).json(&req).send().await {
            Ok(response) => response,
            Err(err) => {
                // Connect failures and timeouts are transient by default.
                return StepOutcome::retryable(format!("request to {url} failed: {err}"));
            }
        };

        let status = response.status();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or_else(|_| serde_json::json!({}));

        outcome_for_status(status, body)
    }
}
