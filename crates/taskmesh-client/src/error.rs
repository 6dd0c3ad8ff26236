//! Error types for the coordinator client.

use thiserror::Error;

/// Errors that can occur when using the coordinator client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The coordinator answered with an error envelope or a non-2xx status.
    #[error("{operation}: {message} ({code}, HTTP {status})")]
    Api {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    /// The response body was not the expected shape.
    #[error("{operation}: failed to decode response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    /// The configured base URL cannot carry API paths.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A store had no record for the key.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// Returns true if the server or store reported a missing record.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { code, status, .. } => code == "NOT_FOUND" || *status == 404,
            _ => false,
        }
    }

    /// Stable error code from the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}
