//! Batch statistics, always recomputed from the full result list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{SimulationMetrics, SimulationResult};

/// Weights of the overall score. They sum to 1.0 by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    pub goal_achievement: f64,
    pub user_satisfaction: f64,
    pub clarity: f64,
    pub relevance: f64,
    pub completeness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            goal_achievement: 0.25,
            user_satisfaction: 0.20,
            clarity: 0.15,
            relevance: 0.20,
            completeness: 0.20,
        }
    }
}

/// Batch-wide means. All zero when there are no results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AverageMetrics {
    pub overall_score: f64,
    pub goal_achievement_rate: f64,
    pub user_satisfaction: f64,
    pub clarity_score: f64,
    pub relevance_score: f64,
    pub completeness_score: f64,
    pub average_turns: f64,
    pub average_response_time: f64,
}

/// Per-persona means.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonaSummary {
    pub runs: usize,
    pub goal_achievement_rate: f64,
    pub avg_satisfaction: f64,
    pub avg_clarity: f64,
    pub avg_relevance: f64,
    pub avg_completeness: f64,
}

/// Per-goal means.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GoalSummary {
    pub runs: usize,
    pub achievement_rate: f64,
    pub avg_turns: f64,
    pub avg_satisfaction: f64,
}

/// Derived statistics over a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchAggregate {
    pub average_metrics: AverageMetrics,
    pub results_by_persona: BTreeMap<String, PersonaSummary>,
    pub results_by_goal: BTreeMap<String, GoalSummary>,
}

fn achieved(m: &SimulationMetrics) -> f64 {
    if m.goal_achieved {
        1.0
    } else {
        0.0
    }
}

fn mean<'a, I, F>(results: I, f: F) -> f64
where
    I: IntoIterator<Item = &'a SimulationResult>,
    F: Fn(&SimulationMetrics) -> f64,
{
    let (sum, count) = results
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), r| (sum + f(&r.metrics), n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl BatchAggregate {
    /// Aggregate with the default weights.
    pub fn compute(results: &[SimulationResult]) -> Self {
        Self::compute_with(results, &ScoreWeights::default())
    }

    /// Aggregate with explicit weights. The overall score is the weighted
    /// sum of the batch-wide means.
    pub fn compute_with(results: &[SimulationResult], weights: &ScoreWeights) -> Self {
        let goal_achievement_rate = mean(results, achieved);
        let user_satisfaction = mean(results, |m| m.user_satisfaction_score);
        let clarity_score = mean(results, |m| m.clarity_score);
        let relevance_score = mean(results, |m| m.relevance_score);
        let completeness_score = mean(results, |m| m.completeness_score);

        let average_metrics = AverageMetrics {
            overall_score: goal_achievement_rate * weights.goal_achievement
                + user_satisfaction * weights.user_satisfaction
                + clarity_score * weights.clarity
                + relevance_score * weights.relevance
                + completeness_score * weights.completeness,
            goal_achievement_rate,
            user_satisfaction,
            clarity_score,
            relevance_score,
            completeness_score,
            average_turns: mean(results, |m| f64::from(m.total_turns)),
            average_response_time: mean(results, |m| m.average_response_time),
        };

        let mut by_persona: BTreeMap<String, Vec<&SimulationResult>> = BTreeMap::new();
        let mut by_goal: BTreeMap<String, Vec<&SimulationResult>> = BTreeMap::new();
        for result in results {
            by_persona
                .entry(result.persona_id().to_string())
                .or_default()
                .push(result);
            by_goal
                .entry(result.goal_id().to_string())
                .or_default()
                .push(result);
        }

        let results_by_persona = by_persona
            .into_iter()
            .map(|(id, group)| {
                let summary = PersonaSummary {
                    runs: group.len(),
                    goal_achievement_rate: mean(group.iter().copied(), achieved),
                    avg_satisfaction: mean(group.iter().copied(), |m| m.user_satisfaction_score),
                    avg_clarity: mean(group.iter().copied(), |m| m.clarity_score),
                    avg_relevance: mean(group.iter().copied(), |m| m.relevance_score),
                    avg_completeness: mean(group.iter().copied(), |m| m.completeness_score),
                };
                (id, summary)
            })
            .collect();

        let results_by_goal = by_goal
            .into_iter()
            .map(|(id, group)| {
                let summary = GoalSummary {
                    runs: group.len(),
                    achievement_rate: mean(group.iter().copied(), achieved),
                    avg_turns: mean(group.iter().copied(), |m| f64::from(m.total_turns)),
                    avg_satisfaction: mean(group.iter().copied(), |m| m.user_satisfaction_score),
                };
                (id, summary)
            })
            .collect();

        Self {
            average_metrics,
            results_by_persona,
            results_by_goal,
        }
    }
}
