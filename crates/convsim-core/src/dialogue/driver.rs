//! Bounded multi-turn dialogue against a chat endpoint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::dialogue::generator::{is_stop_utterance, TurnContext, UtteranceGenerator};
use crate::dialogue::transport::{ChatMessage, ChatTransport};
use crate::domain::conversation::recent_window;
use crate::domain::{ConversationTurn, Goal, Persona};

/// Knobs for a single dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialoguePolicy {
    /// Turns of history handed to the utterance generator.
    pub history_window: usize,
    /// Consecutive failed chat requests that end the dialogue (0 = never).
    pub max_consecutive_transport_errors: u32,
}

impl Default for DialoguePolicy {
    fn default() -> Self {
        Self {
            history_window: 4,
            max_consecutive_transport_errors: 2,
        }
    }
}

/// Why a dialogue ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxTurns,
    GeneratorStopped,
    GeneratorFailed,
    TransportErrors,
}

/// Transcript and bookkeeping from one dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueOutcome {
    pub transcript: Vec<ConversationTurn>,
    /// Latencies of successful replies, in order.
    pub latencies_ms: Vec<u64>,
    pub errors: Vec<String>,
    pub stop_reason: StopReason,
}

/// Drives the conversation: opening query, then generated follow-ups.
#[derive(Clone)]
pub struct DialogueDriver {
    transport: Arc<dyn ChatTransport>,
    generator: Arc<dyn UtteranceGenerator>,
    policy: DialoguePolicy,
}

impl DialogueDriver {
    pub fn new(transport: Arc<dyn ChatTransport>, generator: Arc<dyn UtteranceGenerator>) -> Self {
        Self {
            transport,
            generator,
            policy: DialoguePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DialoguePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DialoguePolicy {
        &self.policy
    }

    /// Run up to `max_turns` user/assistant exchanges against `endpoint`.
    ///
    /// The transcript always alternates user/assistant starting with the
    /// user, and never exceeds `2 * max_turns` entries. A failed chat request
    /// still yields an assistant turn (carrying the transport error marker)
    /// so alternation holds; such placeholders are not sent back to the
    /// assistant in later requests.
    pub async fn drive(
        &self,
        endpoint: &str,
        persona: &Persona,
        goal: &Goal,
        max_turns: u32,
        seed: u64,
    ) -> DialogueOutcome {
        let mut transcript: Vec<ConversationTurn> = Vec::new();
        let mut latencies_ms = Vec::new();
        let mut errors = Vec::new();
        let mut consecutive_failures = 0u32;
        let mut stop_reason = StopReason::MaxTurns;

        for turn in 1..=max_turns {
            let utterance = if turn == 1 {
                goal.opening_query.clone()
            } else {
                let ctx = TurnContext {
                    persona,
                    goal,
                    turn,
                    recent: recent_window(&transcript, self.policy.history_window),
                    seed,
                };
                match self.generator.next_utterance(&ctx).await {
                    Ok(text) if !is_stop_utterance(&text) => text,
                    Ok(_) => {
                        debug!(turn, "utterance generator ended the dialogue");
                        stop_reason = StopReason::GeneratorStopped;
                        break;
                    }
                    Err(e) => {
                        warn!(turn, error = %e, "utterance generation failed");
                        errors.push(format!("turn {turn}: utterance generation failed: {e:#}"));
                        stop_reason = StopReason::GeneratorFailed;
                        break;
                    }
                }
            };

            transcript.push(ConversationTurn::user(&utterance));
            let messages: Vec<ChatMessage> = transcript
                .iter()
                .filter(|t| !t.is_transport_error())
                .map(ChatMessage::from)
                .collect();

            let started = Instant::now();
            match self.transport.send(endpoint, &messages).await {
                Ok(reply) => {
                    let latency = started.elapsed().as_millis() as u64;
                    debug!(turn, latency_ms = latency, "assistant replied");
                    transcript.push(ConversationTurn::assistant(&reply, latency));
                    latencies_ms.push(latency);
                    consecutive_failures = 0;
                }
                Err(e) => {
                    warn!(turn, error = %e, "chat turn failed");
                    errors.push(format!("turn {turn}: {e}"));
                    transcript.push(ConversationTurn::transport_error(&e.to_string()));
                    consecutive_failures += 1;
                    let limit = self.policy.max_consecutive_transport_errors;
                    if limit > 0 && consecutive_failures >= limit {
                        stop_reason = StopReason::TransportErrors;
                        break;
                    }
                }
            }
        }

        DialogueOutcome {
            transcript,
            latencies_ms,
            errors,
            stop_reason,
        }
    }
}
