//! Coordinator process errors.

use thiserror::Error;

/// Errors that end the coordinator's serve loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error from the HTTP server.
    #[error("HTTP server error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP server task panicked.
    #[error("HTTP server task failed: {0}")]
    Task(String),
}
