/// Data model for the isolation engine
///
/// - `tenant`: tenant records, tiers, isolation models, lifecycle status
/// - `binding`: resource bindings and the pool-model tenant filter marker
/// - `job`: provisioning jobs and per-model step sequences

pub mod binding;
pub mod job;
pub mod tenant;
