//! Conversational goals with success criteria.

use serde::{Deserialize, Serialize};

/// Rough difficulty tag for a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

fn default_domain() -> String {
    "general".to_string()
}

/// A scripted conversational objective.
///
/// Used both to drive a run (`opening_query`, `follow_ups`) and to score it
/// (`success_criteria`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    /// Catalog key.
    pub id: String,

    /// What the simulated user is trying to achieve.
    pub description: String,

    /// Ordered criteria the judge checks against the transcript.
    pub success_criteria: Vec<String>,

    /// Turns a well-behaved assistant should need.
    pub expected_turns: u32,

    #[serde(default = "default_domain")]
    pub domain: String,

    pub complexity: Complexity,

    /// First user message, sent verbatim.
    pub opening_query: String,

    /// Scripted user messages for later turns, in order.
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

impl Goal {
    pub fn new(id: &str, description: &str, opening_query: &str, complexity: Complexity) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            success_criteria: Vec::new(),
            expected_turns: 2,
            domain: default_domain(),
            complexity,
            opening_query: opening_query.to_string(),
            follow_ups: Vec::new(),
        }
    }

    pub fn with_criterion(mut self, criterion: &str) -> Self {
        self.success_criteria.push(criterion.to_string());
        self
    }

    pub fn with_follow_up(mut self, utterance: &str) -> Self {
        self.follow_ups.push(utterance.to_string());
        self
    }

    pub fn with_expected_turns(mut self, turns: u32) -> Self {
        self.expected_turns = turns;
        self
    }
}
