use config::BackendConfig;
use thiserror::Error;

use crate::{
    messages::{ChatCompletionRequest, ChatMessage},
    token_estimate,
};

/// A client-supplied value violated a request constraint. The backend is
/// never contacted for these.
#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ValidationError {
    #[error("messages must not be empty")]
    EmptyMessages,

    #[error("temperature must be between 0 and 2, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("max_tokens must be between 1 and {limit}, got {value}")]
    MaxTokensOutOfRange { value: u32, limit: u64 },

    #[error("model '{model}' is not available, allowed models: [{allowed}]")]
    ModelNotAllowed { model: String, allowed: String },

    #[error("estimated {estimated} prompt tokens plus {max_tokens} completion tokens exceed the context length of {limit}")]
    ContextOverflow {
        estimated: u64,
        max_tokens: u32,
        limit: u64,
    },
}

/// A request that passed validation, with the model resolved.
#[derive(Debug, Clone)]
pub(crate) struct ValidRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
}

/// Check a request against the configured limits, reporting the first
/// violated constraint. Requests without an explicit model resolve to the
/// configured default, which is always trusted.
pub(crate) fn validate(request: ChatCompletionRequest, config: &BackendConfig) -> Result<ValidRequest, ValidationError> {
    if request.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    if !(0.0..=2.0).contains(&request.temperature) {
        return Err(ValidationError::TemperatureOutOfRange(request.temperature));
    }

    if request.max_tokens == 0 || u64::from(request.max_tokens) > config.context_length {
        return Err(ValidationError::MaxTokensOutOfRange {
            value: request.max_tokens,
            limit: config.context_length,
        });
    }

    let model = match request.model {
        Some(model) if !config.models.contains(&model) => {
            let allowed = config.models.iter().map(String::as_str).collect::<Vec<_>>().join(", ");

            return Err(ValidationError::ModelNotAllowed { model, allowed });
        }
        Some(model) => model,
        None => config.default_model.clone(),
    };

    let (fits, estimated) = token_estimate::fits_context(&request.messages, request.max_tokens, config.context_length);

    if !fits {
        return Err(ValidationError::ContextOverflow {
            estimated,
            max_tokens: request.max_tokens,
            limit: config.context_length,
        });
    }

    Ok(ValidRequest {
        model,
        messages: request.messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    })
}
