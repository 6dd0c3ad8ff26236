//! Client configuration.

use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of cached agent records.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Connection settings for [`CoordinatorClient`](crate::CoordinatorClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordinator base URL, e.g. `http://127.0.0.1:7331`.
    pub base_url: String,

    /// Bearer token sent with every request.
    pub token: Option<String>,

    pub timeout: Duration,

    pub cache_ttl: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}
