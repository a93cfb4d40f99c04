//! Chat completion gateway in front of an Ollama-compatible inference
//! backend: request validation, budget enforcement, and relay of
//! single-shot and streamed completions into one client-facing shape.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Json, OriginalUri, State},
    response::{
        IntoResponse, Response, Sse,
        sse::Event,
    },
    routing::post,
};
use config::BackendConfig;
use futures::StreamExt;

mod backend;
mod error;
mod messages;
mod relay;
mod token_estimate;
mod validate;

use error::GatewayError;
use messages::ChatCompletionRequest;
use relay::Gateway;

pub(crate) type Result<T> = std::result::Result<T, GatewayError>;

/// Creates an axum router for the chat completion endpoints.
pub fn router(config: BackendConfig) -> anyhow::Result<Router> {
    let gateway = Gateway::new(config).map_err(|e| anyhow::anyhow!("failed to initialize gateway: {e}"))?;

    Ok(Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .with_state(gateway))
}

/// Handle non-streaming chat completion requests.
///
/// The response is a single JSON body; on failure, the mapped status code
/// with a structured error body.
async fn chat(
    State(gateway): State<Gateway>,
    OriginalUri(uri): OriginalUri,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    log::info!(
        "chat completion requested for model: {}",
        request.model.as_deref().unwrap_or("<default>")
    );
    log::debug!("request has {} messages", request.messages.len());

    if request.stream {
        log::debug!("stream flag is ignored here, streaming goes through /chat/stream");
    }

    match gateway.complete(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(uri.path()),
    }
}

/// Handle streaming chat completion requests.
///
/// The response is a Server-Sent Events stream of one data frame per relay
/// event. The final frame is always `[DONE]`, regardless of outcome;
/// failures after the stream is committed appear as an in-band error frame
/// right before it.
async fn chat_stream(
    State(gateway): State<Gateway>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    log::info!(
        "chat stream requested for model: {}",
        request.model.as_deref().unwrap_or("<default>")
    );
    log::debug!("request has {} messages", request.messages.len());

    let events = match gateway.complete_stream(request).await {
        Ok(events) => events,
        // The relay could not be opened; the error still arrives in-band so
        // the frame contract holds on every path.
        Err(e) => {
            log::debug!("chat stream rejected before relaying: {e}");
            futures::stream::once(async move { Err(e) }).boxed()
        }
    };

    let frames = events.map(|result| {
        let event = match result {
            Ok(event) => {
                let json = sonic_rs::to_string(&event).unwrap_or_else(|e| {
                    log::error!("failed to serialize stream event: {e}");
                    GatewayError::Internal(None).stream_frame()
                });

                Event::default().data(json)
            }
            Err(e) => Event::default().data(e.stream_frame()),
        };

        Ok::<_, Infallible>(event)
    });

    let with_done = frames.chain(futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().data("[DONE]"))
    }));

    Sse::new(with_done).into_response()
}
