use std::{collections::BTreeMap, pin::Pin, sync::Arc, time::Instant};

use config::BackendConfig;
use futures::{Stream, StreamExt, stream};
use uuid::Uuid;

use crate::{
    backend::{BackendChunkStream, BackendClient},
    messages::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole, ChatStreamEvent, unix_now},
    validate,
};

/// Type alias for the client-facing event sequence of one streaming call.
///
/// An error item ends the sequence; the `[DONE]` frame is appended by the
/// handler so it cannot be skipped by any exit path.
pub(crate) type EventStream = Pin<Box<dyn Stream<Item = crate::Result<ChatStreamEvent>> + Send>>;

/// Per-process gateway state: the immutable backend configuration and one
/// HTTP client, shared by all concurrent requests.
#[derive(Clone)]
pub(crate) struct Gateway {
    shared: Arc<GatewayInner>,
}

struct GatewayInner {
    config: BackendConfig,
    client: BackendClient,
}

impl Gateway {
    pub(crate) fn new(config: BackendConfig) -> crate::Result<Self> {
        let client = BackendClient::new(&config)?;

        Ok(Self {
            shared: Arc::new(GatewayInner { config, client }),
        })
    }

    /// Process a non-streaming chat completion request: validate, call the
    /// backend once, map the result. Never returns partial results and
    /// never retries.
    pub(crate) async fn complete(&self, request: ChatCompletionRequest) -> crate::Result<ChatCompletionResponse> {
        let message_count = request.messages.len();
        let request = validate::validate(request, &self.shared.config)?;

        // Synthesized before the backend call so the values reflect queuing
        // time.
        let id = Uuid::new_v4().to_string();
        let created = unix_now();
        let started = Instant::now();

        let response = match self.shared.client.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!(
                    "chat completion failed for model {} ({message_count} messages, {}ms): {e}",
                    request.model,
                    started.elapsed().as_millis(),
                );

                return Err(e);
            }
        };

        Ok(ChatCompletionResponse {
            id,
            model: request.model,
            created,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: response.content().to_string(),
            },
            usage: response.usage.unwrap_or_default(),
        })
    }

    /// Open a streaming chat completion relay: validate, open the backend
    /// stream, and re-frame backend chunks into client events in arrival
    /// order.
    pub(crate) async fn complete_stream(&self, request: ChatCompletionRequest) -> crate::Result<EventStream> {
        let message_count = request.messages.len();
        let request = validate::validate(request, &self.shared.config)?;

        let id = Uuid::new_v4().to_string();
        let created = unix_now();
        let started = Instant::now();

        let chunks = match self.shared.client.stream(&request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                log::error!(
                    "opening chat stream failed for model {} ({message_count} messages, {}ms): {e}",
                    request.model,
                    started.elapsed().as_millis(),
                );

                return Err(e);
            }
        };

        Ok(relay_events(chunks, id, request.model, created, started, message_count))
    }
}

struct RelayState {
    chunks: BackendChunkStream,
    id: String,
    model: String,
    created: u64,
    started: Instant,
    message_count: usize,
    finished: bool,
}

/// Re-frame the backend chunk sequence into client stream events.
///
/// Each content-bearing chunk becomes one event; chunks with an empty delta
/// are dropped. The backend's done-chunk becomes the terminal event carrying
/// usage. A backend failure ends the sequence with a single error item; no
/// content events follow it.
fn relay_events(
    chunks: BackendChunkStream,
    id: String,
    model: String,
    created: u64,
    started: Instant,
    message_count: usize,
) -> EventStream {
    let state = RelayState {
        chunks,
        id,
        model,
        created,
        started,
        message_count,
        finished: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            match state.chunks.next().await {
                Some(Ok(mut chunk)) => {
                    if chunk.done {
                        state.finished = true;

                        let usage = chunk.usage.take().unwrap_or_default();
                        let event = state.event(chunk.content(), Some(usage), true);
                        return Some((Ok(event), state));
                    }

                    if chunk.content().is_empty() {
                        continue;
                    }

                    let event = state.event(chunk.content(), None, false);
                    return Some((Ok(event), state));
                }
                Some(Err(e)) => {
                    state.finished = true;

                    log::error!(
                        "chat stream failed for model {} ({} messages, {}ms): {e}",
                        state.model,
                        state.message_count,
                        state.started.elapsed().as_millis(),
                    );

                    return Some((Err(e), state));
                }
                None => {
                    log::warn!("backend stream for model {} ended without a done signal", state.model);
                    return None;
                }
            }
        }
    });

    Box::pin(events)
}

impl RelayState {
    fn event(&self, content: &str, usage: Option<BTreeMap<String, u64>>, terminal: bool) -> ChatStreamEvent {
        ChatStreamEvent {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created,
            delta: ChatMessage {
                role: ChatRole::Assistant,
                content: content.to_string(),
            },
            usage,
            terminal,
        }
    }
}
