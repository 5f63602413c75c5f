//! Dialogue driving: chat transport, utterance generation, and the turn loop.

pub mod driver;
pub mod generator;
pub mod transport;

pub use driver::{DialogueDriver, DialogueOutcome, DialoguePolicy, StopReason};
pub use generator::{
    is_stop_utterance, ScriptedUtteranceGenerator, TurnContext, UtteranceGenerator,
    GENERATION_FAILED_MARKER,
};
pub use transport::{
    parse_reply, ChatMessage, ChatTransport, DialogueTransportError, HttpChatClient, MessagePart,
};
