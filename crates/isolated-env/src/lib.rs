//! isolated-env: disposable backend deployments for conversation simulations
//!
//! Every simulated conversation gets its own deployment of the system under
//! test plus its database, namespaced by run id, on freshly allocated ports.
//! This crate owns that lifecycle:
//!
//! - [`PortAllocator`] finds bindable ports by linear probing
//! - [`Orchestrator`] brings the deployment up/down ([`ComposeOrchestrator`])
//! - [`Probe`] checks readiness and seeds fixtures ([`HttpProbe`])
//! - [`Environment`] / [`ManagedEnvironment`] enforce the state machine
//! - [`EnvironmentProvider`] hands out one environment per run

pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod orchestrator;
pub mod ports;
pub mod probe;
pub mod state;

pub use error::EnvError;
pub use handle::{project_name_for, EnvironmentHandle, Secrets};
pub use lifecycle::{
    Environment, EnvironmentProvider, IsolatedEnvironmentProvider, ManagedEnvironment,
    ReadinessPolicy,
};
pub use orchestrator::{ComposeAction, ComposeConfig, ComposeOrchestrator, Orchestrator};
pub use ports::{PortAllocator, DEFAULT_MAX_ATTEMPTS, DEFAULT_START_PORT};
pub use probe::{HttpProbe, Probe, SeedResponse};
pub use state::EnvironmentState;

/// Result type for isolated-env operations
pub type Result<T> = std::result::Result<T, EnvError>;
