//! Inference backend configuration.

use std::{collections::BTreeSet, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Configuration for the inference backend the gateway relays to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the backend API.
    pub url: Url,

    /// Model used when a request does not name one explicitly.
    pub default_model: String,

    /// Models clients are permitted to request explicitly. An empty set
    /// means only the default model is usable.
    pub models: BTreeSet<String>,

    /// Maximum combined prompt and completion token budget per request.
    pub context_length: u64,

    /// Upper bound for a single backend call. For streaming calls this
    /// bounds the wait for the next piece of data.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:11434").expect("default backend url must parse"),
            default_model: "llama3.1:70b".to_string(),
            models: BTreeSet::new(),
            context_length: 131_072,
            timeout: Duration::from_secs(300),
        }
    }
}
