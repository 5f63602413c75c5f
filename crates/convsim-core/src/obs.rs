//! Structured lifecycle events for simulation runs and batches.
//!
//! - [`RunSpan`] scopes all logging of one simulation to its id
//! - `emit_*` functions log the key lifecycle events at `info!`/`warn!`
//!
//! Environment state transitions are logged by the environment layer itself
//! as `env.transition` debug events.

use tracing::{info, warn};

/// RAII guard that enters a simulation-scoped span.
///
/// Spans must not be held across `.await` points; async code should use
/// [`RunSpan::span`] with `tracing::Instrument` instead.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the simulation id.
    pub fn enter(simulation_id: &str) -> Self {
        Self {
            _span: Self::span(simulation_id).entered(),
        }
    }

    /// The span itself, for instrumenting futures.
    pub fn span(simulation_id: &str) -> tracing::Span {
        tracing::info_span!("convsim.run", simulation_id = %simulation_id)
    }
}

/// A simulation was scheduled for (persona, goal).
pub fn emit_run_started(simulation_id: &str, persona_id: &str, goal_id: &str) {
    info!(
        event = "run.started",
        simulation_id = %simulation_id,
        persona = %persona_id,
        goal = %goal_id,
    );
}

/// A simulation ended, successfully or not.
pub fn emit_run_finished(simulation_id: &str, duration_ms: u64, total_turns: u32, success: bool) {
    info!(
        event = "run.finished",
        simulation_id = %simulation_id,
        duration_ms = duration_ms,
        total_turns = total_turns,
        success = success,
    );
}

/// A simulation failed before producing a result.
pub fn emit_run_failed(simulation_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", simulation_id = %simulation_id, error = %error);
}

/// Tearing down an environment failed. Logged, never retried.
pub fn emit_teardown_warning(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "env.teardown_warning", run_id = %run_id, error = %error);
}

/// A batch completed.
pub fn emit_batch_finished(total_runs: usize, successful_runs: usize, failed_runs: usize) {
    info!(
        event = "batch.finished",
        total_runs = total_runs,
        successful_runs = successful_runs,
        failed_runs = failed_runs,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_enter() {
        let _span = RunSpan::enter("batch-p1-g1-1-0-0");
        emit_run_started("batch-p1-g1-1-0-0", "p1", "g1");
        emit_run_finished("batch-p1-g1-1-0-0", 10, 3, true);
    }
}
