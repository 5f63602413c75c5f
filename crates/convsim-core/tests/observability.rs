//! Lifecycle events emitted by runs and batches.

use async_trait::async_trait;
use convsim_core::obs::{
    emit_batch_finished, emit_run_failed, emit_run_finished, emit_run_started,
    emit_teardown_warning, RunSpan,
};
use convsim_core::{
    BatchCoordinator, BatchRequest, Catalog, Result, SimError, SimulationConfig,
    SimulationResult, SimulationRunner,
};
use std::sync::Arc;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_run_started_carries_persona_and_goal() {
    emit_run_started("batch-p-g-1-0-0", "vague-communicator", "vague-memory-recall");
    assert!(logs_contain("run.started"));
    assert!(logs_contain("vague-communicator"));
}

#[traced_test]
#[test]
fn test_run_finished_and_failed() {
    emit_run_finished("sim-1", 1200, 3, true);
    emit_run_failed("sim-2", &"seed endpoint returned 500");
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("run.failed"));
    assert!(logs_contain("seed endpoint returned 500"));
}

#[traced_test]
#[test]
fn test_teardown_warning_logged() {
    emit_teardown_warning("sim-3", &"docker daemon unreachable");
    assert!(logs_contain("env.teardown_warning"));
}

#[traced_test]
#[test]
fn test_run_span_enter() {
    let span = RunSpan::enter("sim-span");
    tracing::info!("inside run");
    drop(span);
    assert!(logs_contain("sim-span"));
}

struct AlwaysFails;

#[async_trait]
impl SimulationRunner for AlwaysFails {
    async fn run(&self, config: SimulationConfig) -> Result<SimulationResult> {
        Err(SimError::DeadlineExceeded {
            simulation_id: config.simulation_id,
            limit_ms: 10,
        })
    }
}

#[traced_test]
#[tokio::test]
async fn test_batch_emits_finished_even_when_every_run_fails() {
    let catalog = Arc::new(Catalog::builtin());
    let coordinator = BatchCoordinator::new(catalog, Arc::new(AlwaysFails));
    let request = BatchRequest::new(
        vec!["precise-questioner".to_string()],
        vec!["specific-memory-recall".to_string()],
    )
    .with_repetitions(2);

    let outcome = coordinator.run_batch(&request).await;
    assert_eq!(outcome.failed_runs(), 2);
    assert!(logs_contain("batch.finished"));
    assert!(logs_contain("failed_runs=2"));
}

#[traced_test]
#[test]
fn test_batch_finished_direct() {
    emit_batch_finished(4, 3, 1);
    assert!(logs_contain("total_runs=4"));
}
