//! Scoring: the opaque [`Judge`] seam and the [`MetricsExtractor`] that turns
//! its output into a fully populated [`SimulationMetrics`].

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::domain::{ConversationTurn, Goal, Role, SimulationMetrics};

/// Raw judge output. Any field left `None` scores as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeScores {
    pub goal_achieved: Option<bool>,
    pub user_satisfaction: Option<f64>,
    pub clarity: Option<f64>,
    pub relevance: Option<f64>,
    pub completeness: Option<f64>,
}

impl JudgeScores {
    /// Map a 0–3 rubric score onto `0.0..=1.0`.
    pub fn from_rubric_score(score: u8) -> f64 {
        f64::from(score.min(3)) / 3.0
    }
}

/// Scores a finished transcript against a goal.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn score(&self, transcript: &[ConversationTurn], goal: &Goal)
        -> anyhow::Result<JudgeScores>;
}

/// Score and reasoning parsed from a model-style evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub score: u8,
    pub reasoning: String,
}

fn rubric_digit() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-3]\b").ok()).as_ref()
}

/// Byte offset of `marker` (upper case) in `text`, ignoring ASCII case.
fn find_marker(text: &str, marker: &str) -> Option<usize> {
    text.to_ascii_uppercase().find(marker)
}

/// First standalone digit 0–3 after the `SCORE:` marker, else 0.
pub fn parse_judge_score(text: &str) -> u8 {
    let Some(start) = find_marker(text, "SCORE:") else {
        return 0;
    };
    let Some(re) = rubric_digit() else {
        return 0;
    };
    re.find(&text[start + "SCORE:".len()..])
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

impl JudgeVerdict {
    /// Parse `REASONING: ... SCORE: n` output, markers in any case. Missing
    /// reasoning falls back to the whole text.
    pub fn parse(text: &str) -> Self {
        let reasoning = match find_marker(text, "REASONING:") {
            Some(start) => {
                let body_start = start + "REASONING:".len();
                match find_marker(text, "SCORE:") {
                    Some(end) if end > start => text[body_start..end].trim().to_string(),
                    _ => text[body_start..].trim().to_string(),
                }
            }
            None => text.to_string(),
        };
        Self {
            score: parse_judge_score(text),
            reasoning,
        }
    }
}

const STOPWORDS: &[&str] = &[
    "about", "after", "assistant", "either", "their", "there", "these", "which", "while", "would",
    "should", "could", "through", "using", "provides", "understands",
];

fn keywords(text: &str, min_len: usize) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= min_len && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Heuristic judge based on keyword overlap.
///
/// A criterion counts as met when enough of its content words show up in the
/// assistant's replies. Relevance checks each reply against the user message
/// it answers; clarity rewards replies of readable length.
#[derive(Debug, Clone)]
pub struct RuleBasedJudge {
    criterion_coverage: f64,
    achievement_threshold: f64,
}

impl Default for RuleBasedJudge {
    fn default() -> Self {
        Self {
            criterion_coverage: 1.0 / 3.0,
            achievement_threshold: 0.75,
        }
    }
}

impl RuleBasedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    fn criterion_met(&self, criterion: &str, reply_words: &HashSet<String>) -> bool {
        let wanted = keywords(criterion, 5);
        if wanted.is_empty() {
            return true;
        }
        let hits = wanted.iter().filter(|w| reply_words.contains(*w)).count();
        hits as f64 / wanted.len() as f64 >= self.criterion_coverage
    }
}

#[async_trait]
impl Judge for RuleBasedJudge {
    async fn score(
        &self,
        transcript: &[ConversationTurn],
        goal: &Goal,
    ) -> anyhow::Result<JudgeScores> {
        let replies: Vec<(Option<&ConversationTurn>, &ConversationTurn)> = transcript
            .iter()
            .enumerate()
            .filter(|(_, t)| t.role == Role::Assistant && !t.is_transport_error())
            .map(|(i, t)| (i.checked_sub(1).map(|p| &transcript[p]), t))
            .collect();
        let assistant_turns = transcript
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count();

        if replies.is_empty() {
            return Ok(JudgeScores {
                goal_achieved: Some(false),
                ..JudgeScores::default()
            });
        }

        let reply_words: HashSet<String> = replies
            .iter()
            .flat_map(|(_, r)| keywords(&r.text, 5))
            .collect();

        let completeness = if goal.success_criteria.is_empty() {
            1.0
        } else {
            let met = goal
                .success_criteria
                .iter()
                .filter(|c| self.criterion_met(c, &reply_words))
                .count();
            met as f64 / goal.success_criteria.len() as f64
        };

        let relevant = replies
            .iter()
            .filter(|(question, reply)| {
                let asked = question.map(|q| keywords(&q.text, 4)).unwrap_or_default();
                let answered = keywords(&reply.text, 4);
                asked.is_empty() || !asked.is_disjoint(&answered)
            })
            .count();
        let relevance = relevant as f64 / replies.len() as f64;

        let readable = replies
            .iter()
            .filter(|(_, r)| (20..=1200).contains(&r.text.chars().count()))
            .count();
        let clarity = readable as f64 / replies.len() as f64;

        let success_ratio = replies.len() as f64 / assistant_turns.max(1) as f64;
        let user_turns = transcript.iter().filter(|t| t.role == Role::User).count() as f64;
        let expected = f64::from(goal.expected_turns.max(1));
        let turn_penalty = if user_turns > expected {
            expected / user_turns
        } else {
            1.0
        };
        let satisfaction = (0.5 * completeness + 0.5 * success_ratio) * turn_penalty;

        Ok(JudgeScores {
            goal_achieved: Some(completeness >= self.achievement_threshold),
            user_satisfaction: Some(satisfaction),
            clarity: Some(clarity),
            relevance: Some(relevance),
            completeness: Some(completeness),
        })
    }
}

fn clamp_unit(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Turns a transcript into a [`SimulationMetrics`] scorecard.
#[derive(Clone)]
pub struct MetricsExtractor {
    judge: Arc<dyn Judge>,
}

impl MetricsExtractor {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// Every field is populated: judge scores are clamped to `[0, 1]`,
    /// missing ones are zero, and a judge failure zeroes all of them and is
    /// returned as the second element.
    pub async fn extract(
        &self,
        transcript: &[ConversationTurn],
        goal: &Goal,
    ) -> (SimulationMetrics, Option<String>) {
        let (scores, error) = match self.judge.score(transcript, goal).await {
            Ok(scores) => (scores, None),
            Err(e) => (JudgeScores::default(), Some(format!("judge failed: {e:#}"))),
        };

        let total_turns = transcript.iter().filter(|t| t.role == Role::User).count() as u32;
        let latencies: Vec<u64> = transcript
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .filter_map(|t| t.latency_ms)
            .collect();
        let average_response_time = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        let metrics = SimulationMetrics {
            goal_achieved: scores.goal_achieved.unwrap_or(false),
            user_satisfaction_score: clamp_unit(scores.user_satisfaction),
            clarity_score: clamp_unit(scores.clarity),
            relevance_score: clamp_unit(scores.relevance),
            completeness_score: clamp_unit(scores.completeness),
            total_turns,
            average_response_time,
        };
        (metrics, error)
    }
}
