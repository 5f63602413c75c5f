//! convsim-core: simulated multi-turn conversations against isolated
//! deployments of a conversational assistant.
//!
//! A batch walks a persona × goal × repetition matrix. Each cell gets a fresh
//! environment from `isolated-env`, a bounded dialogue, a scorecard, and is
//! torn down before the next cell starts. Results are aggregated into a
//! single report per batch.

pub mod aggregate;
pub mod batch;
pub mod catalog;
pub mod dialogue;
pub mod domain;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod retrieval;
pub mod runner;
pub mod settings;
pub mod telemetry;

pub use aggregate::{AverageMetrics, BatchAggregate, GoalSummary, PersonaSummary, ScoreWeights};
pub use batch::{
    BatchCoordinator, BatchOutcome, BatchRequest, CooldownPolicy, RunFailure,
    SimulationIdGenerator,
};
pub use catalog::Catalog;
pub use dialogue::{
    ChatTransport, DialogueDriver, DialogueOutcome, DialoguePolicy, HttpChatClient,
    ScriptedUtteranceGenerator, StopReason, UtteranceGenerator,
};
pub use domain::{
    Complexity, ConversationTurn, Goal, Persona, PersonaTraits, Result, Role, SimError,
    SimulationConfig, SimulationMetrics, SimulationResult,
};
pub use judge::{parse_judge_score, Judge, JudgeScores, JudgeVerdict, MetricsExtractor, RuleBasedJudge};
pub use reporting::{read_batch_report, render_batch_summary, write_batch_report, BatchReport};
pub use retrieval::RetrievalScore;
pub use runner::{IsolatedRunner, SimulationRunner};
pub use settings::BatchSettings;
pub use telemetry::init_tracing;
