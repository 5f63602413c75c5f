//! Batch coordinator: the persona × goal × repetition matrix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::aggregate::BatchAggregate;
use crate::catalog::Catalog;
use crate::domain::{SimError, SimulationConfig, SimulationResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting::BatchReport;
use crate::runner::SimulationRunner;

/// Pause between consecutive simulations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub delay_ms: u64,
}

impl CooldownPolicy {
    pub fn none() -> Self {
        Self { delay_ms: 0 }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    async fn wait(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(self.delay()).await;
        }
    }
}

/// Mints `batch-{persona}-{goal}-{rep}-{millis}-{seq}` ids.
///
/// The sequence number keeps ids unique even when two cells start within
/// the same millisecond.
#[derive(Debug, Default)]
pub struct SimulationIdGenerator {
    seq: AtomicU64,
}

impl SimulationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `repetition` is zero-based; the id carries it one-based.
    pub fn next(&self, persona_id: &str, goal_id: &str, repetition: u32) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "batch-{persona_id}-{goal_id}-{}-{}-{seq}",
            repetition + 1,
            Utc::now().timestamp_millis()
        )
    }
}

/// Which cells to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRequest {
    pub persona_ids: Vec<String>,
    pub goal_ids: Vec<String>,
    pub repetitions: u32,
    pub max_turns: u32,
    /// Fixed utterance seed for every run; derived per run when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl BatchRequest {
    pub fn new(persona_ids: Vec<String>, goal_ids: Vec<String>) -> Self {
        Self {
            persona_ids,
            goal_ids,
            repetitions: 1,
            max_turns: 5,
            seed: None,
        }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Number of cells in the matrix.
    pub fn cell_count(&self) -> usize {
        self.persona_ids.len() * self.goal_ids.len() * self.repetitions as usize
    }
}

/// A cell that produced no result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    pub persona_id: String,
    pub goal_id: String,
    /// One-based repetition index.
    pub repetition: u32,
    /// Absent when the run was never scheduled (unknown persona or goal).
    pub simulation_id: Option<String>,
    pub error: String,
}

/// Everything a batch produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<SimulationResult>,
    pub failures: Vec<RunFailure>,
}

impl BatchOutcome {
    pub fn successful_runs(&self) -> usize {
        self.results.len()
    }

    pub fn failed_runs(&self) -> usize {
        self.failures.len()
    }

    pub fn total_runs(&self) -> usize {
        self.successful_runs() + self.failed_runs()
    }

    pub fn aggregate(&self) -> BatchAggregate {
        BatchAggregate::compute(&self.results)
    }

    pub fn into_report(self) -> BatchReport {
        BatchReport::from_outcome(self)
    }
}

/// Drives every cell of a [`BatchRequest`] through a [`SimulationRunner`],
/// strictly one at a time.
pub struct BatchCoordinator {
    catalog: Arc<Catalog>,
    runner: Arc<dyn SimulationRunner>,
    cooldown: CooldownPolicy,
    ids: SimulationIdGenerator,
}

impl BatchCoordinator {
    pub fn new(catalog: Arc<Catalog>, runner: Arc<dyn SimulationRunner>) -> Self {
        Self {
            catalog,
            runner,
            cooldown: CooldownPolicy::none(),
            ids: SimulationIdGenerator::new(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: CooldownPolicy) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Run persona, then goal, then repetition order.
    ///
    /// Unknown ids and run errors become counted failures; the batch always
    /// runs to the end. The cooldown separates consecutive runner
    /// invocations and is skipped after the last one.
    pub async fn run_batch(&self, request: &BatchRequest) -> BatchOutcome {
        let started_at = Utc::now();
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut invoked_runner = false;

        info!(
            personas = request.persona_ids.len(),
            goals = request.goal_ids.len(),
            repetitions = request.repetitions,
            cells = request.cell_count(),
            "starting batch"
        );

        for persona_id in &request.persona_ids {
            for goal_id in &request.goal_ids {
                for rep in 0..request.repetitions {
                    let fail = |simulation_id: Option<String>, error: String| RunFailure {
                        persona_id: persona_id.clone(),
                        goal_id: goal_id.clone(),
                        repetition: rep + 1,
                        simulation_id,
                        error,
                    };

                    let persona = match self.catalog.persona(persona_id) {
                        Some(p) => p,
                        None => {
                            let err = SimError::PersonaNotFound(persona_id.clone());
                            warn!(error = %err, "skipping cell");
                            METRICS.inc_runs_failed();
                            failures.push(fail(None, err.to_string()));
                            continue;
                        }
                    };
                    let goal = match self.catalog.goal(goal_id) {
                        Some(g) => g,
                        None => {
                            let err = SimError::GoalNotFound(goal_id.clone());
                            warn!(error = %err, "skipping cell");
                            METRICS.inc_runs_failed();
                            failures.push(fail(None, err.to_string()));
                            continue;
                        }
                    };

                    if invoked_runner {
                        self.cooldown.wait().await;
                    }
                    invoked_runner = true;

                    let simulation_id = self.ids.next(persona_id, goal_id, rep);
                    let mut config = SimulationConfig::new(
                        persona.clone(),
                        goal.clone(),
                        request.max_turns,
                        &simulation_id,
                    );
                    config.seed = request.seed;

                    match self.runner.run(config).await {
                        Ok(result) => {
                            METRICS.inc_runs_succeeded();
                            results.push(result);
                        }
                        Err(e) => {
                            METRICS.inc_runs_failed();
                            failures.push(fail(Some(simulation_id), e.to_string()));
                        }
                    }
                }
            }
        }

        let outcome = BatchOutcome {
            started_at,
            finished_at: Utc::now(),
            results,
            failures,
        };
        obs::emit_batch_finished(
            outcome.total_runs(),
            outcome.successful_runs(),
            outcome.failed_runs(),
        );
        METRICS.flush();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complexity, Goal, Persona, PersonaTraits, Result, SimulationMetrics};
    use async_trait::async_trait;
    use isolated_env::EnvError;
    use std::sync::Mutex;

    /// Records configs; fails runs whose goal id is listed.
    struct FakeRunner {
        seen: Mutex<Vec<SimulationConfig>>,
        failing_goal: Option<String>,
        run_times: Mutex<Vec<tokio::time::Instant>>,
    }

    impl FakeRunner {
        fn new(failing_goal: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                failing_goal: failing_goal.map(str::to_string),
                run_times: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SimulationRunner for FakeRunner {
        async fn run(&self, config: SimulationConfig) -> Result<SimulationResult> {
            self.seen.lock().unwrap().push(config.clone());
            self.run_times.lock().unwrap().push(tokio::time::Instant::now());
            if self.failing_goal.as_deref() == Some(config.goal.id.as_str()) {
                return Err(EnvError::Timeout {
                    run_id: config.simulation_id.clone(),
                    attempts: 30,
                }
                .into());
            }
            Ok(SimulationResult {
                config,
                transcript: Vec::new(),
                metrics: SimulationMetrics::default(),
                errors: Vec::new(),
            })
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(
                vec![
                    Persona::new("p1", "One", PersonaTraits::neutral()),
                    Persona::new("p2", "Two", PersonaTraits::neutral()),
                ],
                vec![
                    Goal::new("g1", "d", "hi", Complexity::Simple),
                    Goal::new("g2", "d", "hey", Complexity::Moderate),
                ],
            )
            .unwrap(),
        )
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simulation_ids_are_unique_and_shaped() {
        let gen = SimulationIdGenerator::new();
        let a = gen.next("p1", "g1", 0);
        let b = gen.next("p1", "g1", 0);
        assert_ne!(a, b);
        assert!(a.starts_with("batch-p1-g1-1-"));
        assert!(a.ends_with("-0"));
        assert!(b.ends_with("-1"));
    }

    #[tokio::test]
    async fn test_matrix_order_persona_goal_repetition() {
        let runner = FakeRunner::new(None);
        let coordinator = BatchCoordinator::new(catalog(), runner.clone());
        let request = BatchRequest::new(ids(&["p1", "p2"]), ids(&["g1", "g2"])).with_repetitions(2);

        let outcome = coordinator.run_batch(&request).await;
        assert_eq!(outcome.total_runs(), 8);
        assert_eq!(outcome.successful_runs(), 8);

        let order: Vec<(String, String)> = runner
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.persona.id.clone(), c.goal.id.clone()))
            .collect();
        let expected: Vec<(String, String)> = [
            ("p1", "g1"), ("p1", "g1"), ("p1", "g2"), ("p1", "g2"),
            ("p2", "g1"), ("p2", "g1"), ("p2", "g2"), ("p2", "g2"),
        ]
        .iter()
        .map(|(p, g)| (p.to_string(), g.to_string()))
        .collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_unknown_goal_counts_without_running() {
        let runner = FakeRunner::new(None);
        let coordinator = BatchCoordinator::new(catalog(), runner.clone());
        let request = BatchRequest::new(ids(&["p1"]), ids(&["g1", "missing"])).with_repetitions(2);

        let outcome = coordinator.run_batch(&request).await;
        assert_eq!(outcome.total_runs(), 4);
        assert_eq!(outcome.successful_runs(), 2);
        assert_eq!(outcome.failed_runs(), 2);
        assert!(outcome.failures.iter().all(|f| f.simulation_id.is_none()));
        assert!(outcome.failures[0].error.contains("missing"));
        assert_eq!(runner.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_failure_counted_and_batch_continues() {
        let runner = FakeRunner::new(Some("g1"));
        let coordinator = BatchCoordinator::new(catalog(), runner.clone());
        let request = BatchRequest::new(ids(&["p1"]), ids(&["g1", "g2"]));

        let outcome = coordinator.run_batch(&request).await;
        assert_eq!(outcome.failed_runs(), 1);
        assert_eq!(outcome.successful_runs(), 1);
        assert!(outcome.failures[0].simulation_id.is_some());
        assert_eq!(outcome.results[0].config.goal.id, "g2");
    }

    #[tokio::test]
    async fn test_seed_and_max_turns_propagate() {
        let runner = FakeRunner::new(None);
        let coordinator = BatchCoordinator::new(catalog(), runner.clone());
        let request = BatchRequest::new(ids(&["p1"]), ids(&["g1"]))
            .with_max_turns(3)
            .with_seed(Some(9));

        coordinator.run_batch(&request).await;
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0].max_turns, 3);
        assert_eq!(seen[0].seed, Some(9));
        assert!(seen[0].api_endpoint.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_runs_only() {
        let runner = FakeRunner::new(None);
        let coordinator = BatchCoordinator::new(catalog(), runner.clone())
            .with_cooldown(CooldownPolicy::fixed(Duration::from_secs(5)));
        let request = BatchRequest::new(ids(&["p1"]), ids(&["g1", "g2"]));

        let begin = tokio::time::Instant::now();
        coordinator.run_batch(&request).await;
        let times = runner.run_times.lock().unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0] - begin, Duration::ZERO);
        assert_eq!(times[1] - times[0], Duration::from_secs(5));
        assert_eq!(tokio::time::Instant::now() - begin, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_request_reports_zero() {
        let coordinator = BatchCoordinator::new(catalog(), FakeRunner::new(None));
        let outcome = coordinator
            .run_batch(&BatchRequest::new(vec![], ids(&["g1"])))
            .await;
        assert_eq!(outcome.total_runs(), 0);
        assert_eq!(outcome.aggregate(), BatchAggregate::default());
    }
}
