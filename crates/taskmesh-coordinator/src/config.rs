//! Coordinator configuration.

use std::time::Duration;

use taskmesh_core::Priority;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: String,

    /// Accepted bearer tokens. Empty disables authentication.
    pub auth_tokens: Vec<String>,

    /// Heartbeat interval handed to nodes at registration.
    pub heartbeat_interval: Duration,

    /// Silence after which an online node is marked offline.
    pub offline_threshold: Duration,

    /// Age after which an unstarted claim is orphaned.
    pub claim_timeout: Duration,

    /// Priority for tasks created without one.
    pub default_priority: Priority,

    /// Per-subscriber event buffer.
    pub event_buffer: usize,

    /// Bound on graceful HTTP shutdown.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Returns true if requests must carry a bearer token.
    pub fn auth_enabled(&self) -> bool {
        !self.auth_tokens.is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7331".to_string(),
            auth_tokens: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            offline_threshold: Duration::from_secs(90),
            claim_timeout: Duration::from_secs(300),
            default_priority: Priority::Medium,
            event_buffer: crate::events::DEFAULT_SUBSCRIBER_CAPACITY,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
