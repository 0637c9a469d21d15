//! Error types for signed session operations.
//!
//! Only failures that leave the caller without a response are errors here.
//! Undecodable bodies are turned into synthetic responses instead, see
//! [`crate::response`].

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by an [`crate::Agent`].
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Request timed out after exhausting the transport retries.
    #[error("request timeout after {attempts} attempts ({timeout_ms}ms each)")]
    Timeout {
        /// Number of attempts made, including the first
        attempts: u32,
        /// Per-request timeout in milliseconds
        timeout_ms: u64,
    },

    /// Connection failed or the body could not be read.
    #[error("network error: {message}")]
    Network {
        /// Error message describing the failure
        message: String,
    },

    /// The session cannot produce a valid request.
    #[error("invalid session configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl SessionError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true for transport failures that may succeed on a later
    /// attempt.
    ///
    /// Configuration errors are permanent: retrying the same request with
    /// the same session cannot fix them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Configuration { .. } => false,
        }
    }
}
