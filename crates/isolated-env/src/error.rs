//! Error types for isolated-env

use thiserror::Error;

use crate::state::EnvironmentState;

/// Errors that can occur while provisioning or tearing down an isolated environment
#[derive(Error, Debug)]
pub enum EnvError {
    /// Port search space exhausted
    #[error("no free port: needed {needed}, probed {start}..={end}")]
    NoFreePort { needed: usize, start: u16, end: u32 },

    /// Launch command failed or could not be spawned
    #[error("environment {run_id} failed to start: {reason}")]
    StartFailure { run_id: String, reason: String },

    /// Readiness probe never succeeded
    #[error("environment {run_id} not ready after {attempts} attempt(s)")]
    Timeout { run_id: String, attempts: u32 },

    /// Fixture seeding rejected or unreachable
    #[error("seeding environment {run_id} failed: {reason}")]
    SeedFailure { run_id: String, reason: String },

    /// Teardown command failed
    #[error("teardown of environment {run_id} failed: {reason}")]
    TeardownFailure { run_id: String, reason: String },

    /// Lifecycle method called out of order
    #[error("invalid lifecycle transition for {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: EnvironmentState,
        to: EnvironmentState,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for EnvError {
    fn from(err: reqwest::Error) -> Self {
        EnvError::Http(err.to_string())
    }
}

impl EnvError {
    /// Whether this error happened before the environment was seeded and
    /// therefore aborts the current run.
    pub fn aborts_run(&self) -> bool {
        !matches!(self, EnvError::TeardownFailure { .. })
    }
}
