/// Provisioning backends
///
/// The backend is the seam between the orchestrator and real
/// infrastructure. Each backend implements `ProvisioningBackend` and
/// executes individual steps idempotently, classifying failures as
/// retryable or fatal.
///
/// # Backend Types
///
/// - **Mock**: deterministic simulated execution for tests and demos
/// - **Http**: forwards steps to an external provisioning service

pub mod backend_trait;
pub mod http;
pub mod mock;

// Re-export main types
pub use backend_trait::{ProvisioningBackend, StepOutcome, StepRequest};
pub use http::HttpBackend;
pub use mock::MockBackend;
