use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::aggregate::{AverageMetrics, BatchAggregate, GoalSummary, PersonaSummary};
use crate::batch::{BatchOutcome, RunFailure};
use crate::domain::SimulationResult;

/// Batch result file, written once per batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub timestamp: DateTime<Utc>,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub average_metrics: AverageMetrics,
    pub results_by_persona: BTreeMap<String, PersonaSummary>,
    pub results_by_goal: BTreeMap<String, GoalSummary>,
    pub all_results: Vec<SimulationResult>,
    #[serde(default)]
    pub failures: Vec<RunFailure>,
}

impl BatchReport {
    pub fn from_outcome(outcome: BatchOutcome) -> Self {
        let aggregate = outcome.aggregate();
        Self::from_parts(outcome.finished_at, aggregate, outcome.results, outcome.failures)
    }

    fn from_parts(
        timestamp: DateTime<Utc>,
        aggregate: BatchAggregate,
        results: Vec<SimulationResult>,
        failures: Vec<RunFailure>,
    ) -> Self {
        Self {
            timestamp,
            total_runs: results.len() + failures.len(),
            successful_runs: results.len(),
            failed_runs: failures.len(),
            average_metrics: aggregate.average_metrics,
            results_by_persona: aggregate.results_by_persona,
            results_by_goal: aggregate.results_by_goal,
            all_results: results,
            failures,
        }
    }

    /// `isolated-batch-results-<timestamp>.json`, colon-free.
    pub fn file_name(&self) -> String {
        format!(
            "isolated-batch-results-{}.json",
            self.timestamp.format("%Y-%m-%dT%H-%M-%S%.3f")
        )
    }
}

/// Write the report into `dir` (created if missing) and return its path.
pub fn write_batch_report(dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let path = dir.join(report.file_name());
    let content = serde_json::to_string_pretty(report).context("serialize batch report")?;
    std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
    Ok(path)
}

/// Read a previously written report.
pub fn read_batch_report(path: &Path) -> Result<BatchReport> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Plain-text summary for terminals.
pub fn render_batch_summary(report: &BatchReport) -> String {
    let m = &report.average_metrics;
    let mut out = String::new();
    out.push_str("Batch Summary\n");
    out.push_str(&format!(
        "  runs: {} total, {} succeeded, {} failed\n",
        report.total_runs, report.successful_runs, report.failed_runs
    ));
    out.push_str(&format!(
        "  overall score: {:.3}\n  goal achievement: {:.1}%\n  satisfaction: {:.3}  clarity: {:.3}  relevance: {:.3}  completeness: {:.3}\n  avg turns: {:.2}  avg response: {:.0}ms\n",
        m.overall_score,
        m.goal_achievement_rate * 100.0,
        m.user_satisfaction,
        m.clarity_score,
        m.relevance_score,
        m.completeness_score,
        m.average_turns,
        m.average_response_time
    ));

    if !report.results_by_persona.is_empty() {
        out.push_str("\nBy persona\n");
        for (id, s) in &report.results_by_persona {
            out.push_str(&format!(
                "  {id}: {} runs, {:.1}% achieved, satisfaction {:.3}\n",
                s.runs,
                s.goal_achievement_rate * 100.0,
                s.avg_satisfaction
            ));
        }
    }

    if !report.results_by_goal.is_empty() {
        out.push_str("\nBy goal\n");
        for (id, s) in &report.results_by_goal {
            out.push_str(&format!(
                "  {id}: {} runs, {:.1}% achieved, {:.2} turns\n",
                s.runs,
                s.achievement_rate * 100.0,
                s.avg_turns
            ));
        }
    }

    if !report.failures.is_empty() {
        out.push_str("\nFailures\n");
        for f in &report.failures {
            out.push_str(&format!(
                "  {}/{} #{}: {}\n",
                f.persona_id, f.goal_id, f.repetition, f.error
            ));
        }
    }
    out
}
