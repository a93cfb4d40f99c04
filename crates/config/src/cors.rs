//! CORS configuration.

use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::Deserialize;
use url::Url;

/// CORS settings applied to every client-facing route.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the gateway. When absent, any origin is
    /// accepted.
    pub allow_origins: Option<Vec<Url>>,

    /// Whether credentialed requests are allowed.
    pub allow_credentials: bool,

    /// How long preflight results may be cached.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub max_age: Option<Duration>,
}
