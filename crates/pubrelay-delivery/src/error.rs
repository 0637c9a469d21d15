//! Error types for the delivery pipeline.
//!
//! Remote rejections and transport failures are not errors at this level:
//! the executor turns them into retries or a [`crate::DeliveryOutcome`].
//! What remains are pool, configuration and lifecycle failures.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised by the delivery pipeline.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The session factory failed while filling the pool.
    #[error("failed to create session {index}: {message}")]
    PoolInit {
        /// Zero-based index of the session that failed
        index: usize,
        /// Factory error message
        message: String,
    },

    /// Invalid delivery configuration.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// No session became free within the acquire timeout.
    #[error("no session available after {timeout:?}")]
    AcquireTimeout {
        /// Time waited
        timeout: Duration,
    },

    /// The wait was cancelled by shutdown.
    #[error("delivery cancelled by shutdown")]
    Cancelled,

    /// In-flight deliveries did not finish within the shutdown timeout.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Time waited before cancelling
        timeout: Duration,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    Internal {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a pool initialization error.
    pub fn pool_init(index: usize, message: impl Into<String>) -> Self {
        Self::PoolInit { index, message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns true when waiting again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AcquireTimeout { .. } => true,
            Self::PoolInit { .. }
            | Self::Configuration { .. }
            | Self::Cancelled
            | Self::ShutdownTimeout { .. }
            | Self::Internal { .. } => false,
        }
    }
}
