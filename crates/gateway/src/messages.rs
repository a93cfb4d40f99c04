use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in conversation order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: ChatRole,
    pub(crate) content: String,
}

/// Request body accepted by both chat completion endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionRequest {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) model: Option<String>,
    #[serde(default = "default_temperature")]
    pub(crate) temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub(crate) max_tokens: u32,
    #[serde(default)]
    pub(crate) stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

/// Response for a non-streaming chat completion.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionResponse {
    pub(crate) id: String,
    pub(crate) model: String,
    pub(crate) created: u64,
    pub(crate) message: ChatMessage,
    pub(crate) usage: BTreeMap<String, u64>,
}

/// One event of a streaming chat completion.
///
/// All events of a stream share the same `id` and `created` values. The
/// `terminal` event is the last content-bearing event and the only one
/// carrying `usage`; the `[DONE]` frame that ends the response body is
/// emitted separately and is not an event.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatStreamEvent {
    pub(crate) id: String,
    pub(crate) model: String,
    pub(crate) created: u64,
    pub(crate) delta: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<BTreeMap<String, u64>>,
    pub(crate) terminal: bool,
}

/// Current time as unix seconds.
pub(crate) fn unix_now() -> u64 {
    jiff::Timestamp::now().as_second().max(0) as u64
}
