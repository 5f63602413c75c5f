//! Chat endpoint transport.
//!
//! Requests carry the full message history as
//! `{"messages":[{"role":..,"parts":[{"type":"text","text":..}]}]}`. Replies
//! are either a server-sent event stream of `text-delta` chunks or a plain
//! text body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::{ConversationTurn, Result, Role};

/// One text part of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// A message in the chat request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub fn text(role: Role, text: &str) -> Self {
        Self {
            role,
            parts: vec![MessagePart {
                kind: "text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        ChatMessage::text(turn.role, &turn.text)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

/// Failure of a single chat turn. Recorded on the result, never fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DialogueTransportError {
    #[error("chat request failed: {0}")]
    Request(String),

    #[error("chat endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat endpoint returned an empty reply")]
    EmptyReply,
}

/// Sends a conversation to the assistant and returns its reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, DialogueTransportError>;
}

/// Extract the assistant text from a reply body.
///
/// If any line is an SSE `data:` line the body is treated as a stream and
/// only `text-delta` chunks contribute; malformed chunks and other event
/// types are skipped. Otherwise the trimmed body is the reply. `None` means
/// nothing usable came back.
pub fn parse_reply(body: &str) -> Option<String> {
    let mut is_stream = false;
    let mut text = String::new();

    for line in body.lines() {
        let Some(payload) = line.trim_start().strip_prefix("data:") else {
            continue;
        };
        is_stream = true;
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<serde_json::Value>(payload) else {
            continue;
        };
        if chunk.get("type").and_then(|t| t.as_str()) == Some("text-delta") {
            if let Some(delta) = chunk.get("delta").and_then(|d| d.as_str()) {
                text.push_str(delta);
            }
        }
    }

    if !is_stream {
        text = body.trim().to_string();
    }
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// [`ChatTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpChatClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("convsim/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn send(
        &self,
        endpoint: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, DialogueTransportError> {
        debug!(%endpoint, messages = messages.len(), "sending chat request");
        let response = self
            .client
            .post(endpoint)
            .timeout(self.request_timeout)
            .json(&ChatRequest { messages })
            .send()
            .await
            .map_err(|e| DialogueTransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DialogueTransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(DialogueTransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_reply(&body).ok_or(DialogueTransportError::EmptyReply)
    }
}
