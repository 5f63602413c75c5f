//! Conversation transcript primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display prefix of assistant turns that stand in for a failed chat request.
pub const TRANSPORT_ERROR_MARKER: &str = "[transport error]";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Round-trip latency of the reply (assistant turns that succeeded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Set when the turn stands in for a chat request that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversationTurn {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            timestamp: Utc::now(),
            latency_ms: None,
            error: None,
        }
    }

    pub fn assistant(text: &str, latency_ms: u64) -> Self {
        Self {
            role: Role::Assistant,
            text: text.to_string(),
            timestamp: Utc::now(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    /// Placeholder assistant turn for a reply that never arrived.
    pub fn transport_error(reason: &str) -> Self {
        Self {
            role: Role::Assistant,
            text: format!("{TRANSPORT_ERROR_MARKER} {reason}"),
            timestamp: Utc::now(),
            latency_ms: None,
            error: Some(reason.to_string()),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Whether turns strictly alternate user/assistant, starting with the user.
pub fn alternates_from_user(transcript: &[ConversationTurn]) -> bool {
    transcript.iter().enumerate().all(|(i, turn)| {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        turn.role == expected
    })
}

/// The last `window` turns of a transcript.
pub fn recent_window(transcript: &[ConversationTurn], window: usize) -> &[ConversationTurn] {
    let start = transcript.len().saturating_sub(window);
    &transcript[start..]
}
