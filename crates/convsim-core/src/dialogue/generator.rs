//! Persona-conditioned user utterance generation.

use async_trait::async_trait;

use crate::domain::{ConversationTurn, Goal, Persona};

/// Prefix a generator may return instead of an error to signal failure.
pub const GENERATION_FAILED_MARKER: &str = "[generation failed]";

/// What a generator sees when asked for the next user turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub persona: &'a Persona,
    pub goal: &'a Goal,
    /// 1-based index of the turn being generated (always >= 2).
    pub turn: u32,
    /// Bounded window of the most recent transcript turns.
    pub recent: &'a [ConversationTurn],
    pub seed: u64,
}

/// Produces the next user utterance.
///
/// An `Err`, an empty string, or text starting with
/// [`GENERATION_FAILED_MARKER`] ends the dialogue early.
#[async_trait]
pub trait UtteranceGenerator: Send + Sync {
    async fn next_utterance(&self, ctx: &TurnContext<'_>) -> anyhow::Result<String>;
}

/// Whether generator output means "stop the dialogue".
pub fn is_stop_utterance(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.starts_with(GENERATION_FAILED_MARKER)
}

const VAGUE_NUDGES: &[&str] = &[
    "Hmm, I'm not sure. Can you check again?",
    "I don't remember exactly, maybe something else?",
    "That doesn't ring a bell. What else is there?",
];

const PRECISE_NUDGES: &[&str] = &[
    "Can you give me the exact details you have stored?",
    "Please confirm exactly what you found.",
    "Is there anything else stored about that?",
];

const RESISTANT_REPLIES: &[&str] = &[
    "I already told you. Just look it up.",
    "Why do you keep asking? You should know this.",
];

/// Deterministic generator that plays the goal's scripted follow-ups.
///
/// Once the script is exhausted, patient personas keep nudging with canned
/// lines picked by the seed (vague or precise phrasing depending on
/// `clarity_of_communication`); impatient ones end the dialogue. Personas
/// with low frustration tolerance push back on clarifying questions.
#[derive(Debug, Clone)]
pub struct ScriptedUtteranceGenerator {
    patience_threshold: f64,
    frustration_threshold: f64,
}

impl Default for ScriptedUtteranceGenerator {
    fn default() -> Self {
        Self {
            patience_threshold: 0.3,
            frustration_threshold: 0.35,
        }
    }
}

impl ScriptedUtteranceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pick<'a>(pool: &[&'a str], seed: u64, turn: u32) -> &'a str {
        let mixed = splitmix64(seed ^ u64::from(turn));
        pool[(mixed % pool.len() as u64) as usize]
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[async_trait]
impl UtteranceGenerator for ScriptedUtteranceGenerator {
    async fn next_utterance(&self, ctx: &TurnContext<'_>) -> anyhow::Result<String> {
        let traits = &ctx.persona.traits;
        let last_reply_asks = ctx
            .recent
            .last()
            .map(|t| t.text.trim_end().ends_with('?'))
            .unwrap_or(false);

        if last_reply_asks && traits.frustration_tolerance < self.frustration_threshold {
            return Ok(Self::pick(RESISTANT_REPLIES, ctx.seed, ctx.turn).to_string());
        }

        let index = ctx.turn.saturating_sub(2) as usize;
        if let Some(scripted) = ctx.goal.follow_ups.get(index) {
            return Ok(scripted.clone());
        }

        if traits.patience < self.patience_threshold {
            return Ok(String::new());
        }

        let pool = if traits.clarity_of_communication < 0.5 {
            VAGUE_NUDGES
        } else {
            PRECISE_NUDGES
        };
        Ok(Self::pick(pool, ctx.seed, ctx.turn).to_string())
    }
}
