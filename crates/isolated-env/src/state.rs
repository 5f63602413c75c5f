//! Lifecycle states of an isolated environment.

use serde::{Deserialize, Serialize};

/// Where an environment is in its lifecycle.
///
/// ```text
/// UNSTARTED -> STARTING -> READY -> SEEDED -> STOPPING -> STOPPED
/// ```
///
/// `ERROR` is reachable from every non-terminal state and blocks any further
/// forward progress. Teardown (`STOPPING`) is still permitted from `ERROR`,
/// since a failed start can leave containers or volumes behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentState {
    Unstarted,
    Starting,
    Ready,
    Seeded,
    Stopping,
    Stopped,
    Error,
}

impl EnvironmentState {
    /// `STOPPED` is the only terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, EnvironmentState::Stopped)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: EnvironmentState) -> bool {
        use EnvironmentState::*;
        match (self, next) {
            (Unstarted, Starting) | (Starting, Ready) | (Ready, Seeded) => true,
            (Stopping, Stopped) | (Stopping, Error) => true,
            (Stopped, _) => false,
            (Stopping, _) => false,
            (_, Stopping) => true,
            (Error, _) => false,
            (_, Error) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnvironmentState::Unstarted => "UNSTARTED",
            EnvironmentState::Starting => "STARTING",
            EnvironmentState::Ready => "READY",
            EnvironmentState::Seeded => "SEEDED",
            EnvironmentState::Stopping => "STOPPING",
            EnvironmentState::Stopped => "STOPPED",
            EnvironmentState::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}
