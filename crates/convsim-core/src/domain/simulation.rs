//! Per-run configuration, scorecard, and result record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::conversation::ConversationTurn;
use crate::domain::goal::Goal;
use crate::domain::persona::Persona;

/// Everything needed to run one simulated conversation.
///
/// `api_endpoint` starts empty (or pointing at a shared deployment) and is
/// rebound to the isolated environment's chat endpoint once it is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub persona: Persona,
    pub goal: Goal,
    pub max_turns: u32,
    pub api_endpoint: String,
    pub simulation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn new(persona: Persona, goal: Goal, max_turns: u32, simulation_id: &str) -> Self {
        Self {
            persona,
            goal,
            max_turns,
            api_endpoint: String::new(),
            simulation_id: simulation_id.to_string(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.api_endpoint = endpoint.to_string();
        self
    }

    /// Point the run at the chat endpoint of its environment.
    pub fn rebind_endpoint(&mut self, endpoint: &str) {
        self.api_endpoint = endpoint.to_string();
    }

    /// The explicit seed, or one derived from the simulation id.
    pub fn effective_seed(&self) -> u64 {
        if let Some(seed) = self.seed {
            return seed;
        }
        let digest = Sha256::digest(self.simulation_id.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

/// Scorecard for one run. Every field defaults to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationMetrics {
    pub goal_achieved: bool,
    pub user_satisfaction_score: f64,
    pub clarity_score: f64,
    pub relevance_score: f64,
    pub completeness_score: f64,
    /// Number of user turns.
    pub total_turns: u32,
    /// Mean assistant latency in milliseconds.
    pub average_response_time: f64,
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    pub transcript: Vec<ConversationTurn>,
    pub metrics: SimulationMetrics,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SimulationResult {
    pub fn persona_id(&self) -> &str {
        &self.config.persona.id
    }

    pub fn goal_id(&self) -> &str {
        &self.config.goal.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::goal::Complexity;
    use crate::domain::persona::PersonaTraits;

    fn config(id: &str) -> SimulationConfig {
        SimulationConfig::new(
            Persona::new("p1", "P", PersonaTraits::neutral()),
            Goal::new("g1", "d", "hello", Complexity::Simple),
            3,
            id,
        )
    }

    #[test]
    fn test_effective_seed_prefers_explicit() {
        assert_eq!(config("a").with_seed(42).effective_seed(), 42);
    }

    #[test]
    fn test_effective_seed_stable_per_id() {
        assert_eq!(config("a").effective_seed(), config("a").effective_seed());
        assert_ne!(config("a").effective_seed(), config("b").effective_seed());
    }

    #[test]
    fn test_rebind_only_touches_endpoint() {
        let original = config("sim-1");
        let mut rebound = original.clone();
        rebound.rebind_endpoint("http://127.0.0.1:3001/api/chat");
        assert_eq!(rebound.api_endpoint, "http://127.0.0.1:3001/api/chat");
        assert_eq!(rebound.simulation_id, original.simulation_id);
        assert_eq!(rebound.goal, original.goal);
    }

    #[test]
    fn test_metrics_fill_missing_fields_with_zero() {
        let metrics: SimulationMetrics =
            serde_json::from_value(serde_json::json!({ "clarity_score": 0.5 })).unwrap();
        assert_eq!(metrics.clarity_score, 0.5);
        assert!(!metrics.goal_achieved);
        assert_eq!(metrics.total_turns, 0);
    }
}
