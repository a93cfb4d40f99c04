//! Context budget estimation for incoming requests.

use crate::messages::ChatMessage;

/// Tokens assumed per whitespace-delimited word.
const TOKENS_PER_WORD: f64 = 1.3;

/// Estimate the prompt token count of a message sequence.
///
/// Word count scaled by [`TOKENS_PER_WORD`] stands in for the backend
/// tokenizer. The estimate is intentionally coarse: it bounds context usage
/// for budget enforcement and does not reproduce the backend's exact token
/// accounting.
pub(crate) fn estimate_prompt_tokens(messages: &[ChatMessage]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

fn estimate_message_tokens(message: &ChatMessage) -> u64 {
    let words = message.content.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD).ceil() as u64
}

/// Check whether a prompt plus the requested completion budget fits the
/// model context. Returns the verdict together with the prompt estimate.
pub(crate) fn fits_context(messages: &[ChatMessage], max_tokens: u32, context_length: u64) -> (bool, u64) {
    let estimated = estimate_prompt_tokens(messages);

    (estimated + u64::from(max_tokens) <= context_length, estimated)
}
