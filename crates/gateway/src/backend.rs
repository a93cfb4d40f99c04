use std::{collections::BTreeMap, pin::Pin, time::Duration};

use bytes::BytesMut;
use config::BackendConfig;
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::{error::GatewayError, messages::ChatMessage, validate::ValidRequest};

/// At most one decoded chunk is buffered ahead of the consumer. A dropped
/// consumer fails the next send, which stops the producer task.
const CHUNK_BUFFER: usize = 1;

/// Type alias for the decoded backend chunk sequence of one streaming call.
///
/// The sequence is lazy, finite and non-restartable; chunks arrive in
/// backend order.
pub(crate) type BackendChunkStream = Pin<Box<dyn Stream<Item = crate::Result<BackendChunk>> + Send>>;

/// One decoded object of the backend's line-oriented streaming protocol.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BackendChunk {
    #[serde(default)]
    pub(crate) message: Option<BackendMessage>,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) usage: Option<BTreeMap<String, u64>>,
}

impl BackendChunk {
    pub(crate) fn content(&self) -> &str {
        self.message.as_ref().map(|message| message.content.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BackendMessage {
    #[serde(default)]
    pub(crate) content: String,
}

/// Non-streaming backend response body.
#[derive(Debug, Deserialize)]
pub(crate) struct BackendChatResponse {
    #[serde(default)]
    message: Option<BackendMessage>,
    #[serde(default)]
    pub(crate) usage: Option<BTreeMap<String, u64>>,
}

impl BackendChatResponse {
    pub(crate) fn content(&self) -> &str {
        self.message.as_ref().map(|message| message.content.as_str()).unwrap_or("")
    }
}

/// Wire request for `POST {backend}/api/chat`, shared by both call shapes.
#[derive(Debug, Serialize)]
struct BackendChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

impl<'a> BackendChatRequest<'a> {
    fn new(request: &'a ValidRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// HTTP client for the inference backend. One instance is shared by all
/// concurrent requests.
pub(crate) struct BackendClient {
    client: reqwest::Client,
    chat_url: Url,
    timeout: Duration,
}

impl BackendClient {
    pub(crate) fn new(config: &BackendConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .read_timeout(config.timeout)
            .build()
            .map_err(|e| {
                log::error!("failed to create HTTP client for the backend: {e}");
                GatewayError::Internal(None)
            })?;

        let chat_url = config.url.join("api/chat").map_err(|e| {
            log::error!("invalid backend url '{}': {e}", config.url);
            GatewayError::Internal(None)
        })?;

        Ok(Self {
            client,
            chat_url,
            timeout: config.timeout,
        })
    }

    /// Single-shot chat completion. The configured timeout bounds the whole
    /// call.
    pub(crate) async fn complete(&self, request: &ValidRequest) -> crate::Result<BackendChatResponse> {
        let response = self
            .client
            .post(self.chat_url.clone())
            .timeout(self.timeout)
            .json(&BackendChatRequest::new(request, false))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown backend error".to_string());
            log::error!("backend error ({status}): {message}");

            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        // Read as text first so a parse failure can be logged with the payload.
        let text = response.text().await.map_err(map_transport_error)?;

        sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse backend chat response: {e}");
            log::debug!("raw response that failed to parse: {text}");
            GatewayError::Internal(None)
        })
    }

    /// Streaming chat completion. Exactly one connection is opened; it is
    /// released on every exit path, including a dropped consumer.
    pub(crate) async fn stream(&self, request: &ValidRequest) -> crate::Result<BackendChunkStream> {
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(&BackendChatRequest::new(request, true))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown backend error".to_string());
            log::error!("backend error ({status}): {message}");

            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(read_chunks(response, tx));

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })))
    }
}

/// Producer half of a streaming call: reads response bytes, decodes one
/// JSON object per line and forwards them over the channel. Returns when
/// the backend stream ends, errors, or the receiver is gone. Dropping the
/// response closes the backend connection.
async fn read_chunks(response: reqwest::Response, tx: mpsc::Sender<crate::Result<BackendChunk>>) {
    let mut body = response.bytes_stream();
    let mut buffer = BytesMut::new();

    loop {
        while let Some(line_end) = find_newline(&buffer) {
            let line = buffer.split_to(line_end);

            let Some(chunk) = decode_line(&line) else {
                continue;
            };

            if tx.send(Ok(chunk)).await.is_err() {
                return;
            }
        }

        match body.next().await {
            Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
            Some(Err(e)) => {
                let _ = tx.send(Err(map_transport_error(e))).await;
                return;
            }
            None => {
                // Flush trailing data that arrived without a final newline.
                if let Some(chunk) = decode_line(&buffer) {
                    let _ = tx.send(Ok(chunk)).await;
                }

                return;
            }
        }
    }
}

/// Decode one line into a chunk. Garbled or partial lines are expected at
/// line-buffering edges and are skipped, not surfaced as errors.
fn decode_line(line: &[u8]) -> Option<BackendChunk> {
    let line = std::str::from_utf8(line).ok()?.trim();

    if line.is_empty() {
        return None;
    }

    match sonic_rs::from_str(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            log::debug!("skipping malformed backend line: {e}");
            None
        }
    }
}

fn find_newline(buffer: &BytesMut) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::BackendTimeout
    } else {
        GatewayError::Internal(Some(format!("backend connection failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_content_chunk() {
        let chunk = decode_line(br#"{"message":{"role":"assistant","content":"hello"},"done":false}"#).unwrap();

        assert_eq!("hello", chunk.content());
        assert!(!chunk.done);
        assert_eq!(None, chunk.usage);
    }

    #[test]
    fn decode_done_chunk_with_usage() {
        let chunk = decode_line(br#"{"message":{"content":""},"done":true,"usage":{"total":42}}"#).unwrap();

        assert!(chunk.done);
        assert_eq!(Some(&42), chunk.usage.as_ref().and_then(|usage| usage.get("total")));
    }

    #[test]
    fn garbled_lines_are_skipped() {
        assert!(decode_line(b"").is_none());
        assert!(decode_line(b"   \r").is_none());
        assert!(decode_line(b"{\"message\":{\"content\":\"trunc").is_none());
        assert!(decode_line(b"not json at all").is_none());
        assert!(decode_line(&[0xff, 0xfe, 0x00]).is_none());
    }

    #[test]
    fn chunk_without_message_has_empty_content() {
        let chunk = decode_line(br#"{"done":false}"#).unwrap();
        assert_eq!("", chunk.content());
    }

    #[test]
    fn newline_scanning_returns_position_after_the_newline() {
        let mut buffer = BytesMut::from(&b"{\"done\":true}\nrest"[..]);

        let end = find_newline(&buffer).unwrap();
        assert_eq!(14, end);

        let line = buffer.split_to(end);
        assert_eq!(&b"{\"done\":true}\n"[..], &line[..]);
        assert_eq!(&b"rest"[..], &buffer[..]);
        assert_eq!(None, find_newline(&buffer));
    }
}
