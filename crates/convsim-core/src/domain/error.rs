//! Domain-level error taxonomy for convsim.

use isolated_env::EnvError;

/// convsim domain errors.
///
/// Environment failures up to and including seeding abort only the run they
/// occur in; the batch coordinator turns every variant into a counted
/// failure. Per-turn transport errors and teardown problems never surface
/// here, they are recorded on the result or logged.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error("environment error: {0}")]
    Environment(#[from] EnvError),

    #[error("run {simulation_id} exceeded its deadline of {limit_ms}ms")]
    DeadlineExceeded { simulation_id: String, limit_ms: u64 },

    #[error("run {simulation_id} panicked: {reason}")]
    Panicked {
        simulation_id: String,
        reason: String,
    },

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("http client error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SimError {
    fn from(err: reqwest::Error) -> Self {
        SimError::Http(err.to_string())
    }
}

impl SimError {
    /// Whether the failure happened before any environment was started.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, SimError::PersonaNotFound(_) | SimError::GoalNotFound(_))
    }
}

/// Result type for convsim domain operations.
pub type Result<T> = std::result::Result<T, SimError>;
